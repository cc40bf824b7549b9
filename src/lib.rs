#![forbid(unsafe_code)]

pub mod ambient;
pub mod assets;
pub mod clock;
pub mod composite;
pub mod config;
pub mod control;
pub mod controller;
pub mod display;
pub mod engine;
pub mod foundation;
pub mod quantize;
pub mod resolve;
pub mod schedule;
pub mod settings;
pub mod sink;
pub mod source;
pub mod transitions;

pub use ambient::{AmbientDevice, AmbientDispatcher, WledDevice};
pub use assets::{ArtworkFetcher, ArtworkLoader, HttpFetcher, Resample, decode_cover};
pub use clock::{ClockTime, render_clock};
pub use composite::FrameCompositor;
pub use config::AppConfig;
pub use control::{ControlHandle, DisplayStatus};
pub use controller::{Command, Controller, ControllerThread};
pub use display::{DisplayInput, DisplayMachine, DisplayOptions, DisplayState, InputPacer};
pub use engine::{FramePacer, NoPacer, SleepPacer, TransitionJob, TransitionOutcome, run_transition};
pub use foundation::core::{Fps, PixelGrid, Rgb8};
pub use foundation::error::{CoverError, CoverResult};
pub use quantize::{AmbientColorPair, pick_ambient_pair, quantize};
pub use resolve::{
    CoverEvent, CoverIdentity, CoverResolver, EntitySnapshot, MediaEntity, PlaybackState,
    Resolution, ResolverTiming, resolve_cover,
};
pub use settings::{ApplyOutcome, ChangeSet, DisplaySettings, RejectedField, SettingsStore};
pub use sink::{MemorySink, NullSink, PipeSink, PixelSink, open_sink};
pub use source::{HassPoller, JsonLinesSource};
pub use transitions::{Direction, Orientation, TransitionKind};
