//! The display state machine: the single owner of the pixel sink.
//!
//! `Idle` shows the clock (or nothing), `Showing` holds a cover on screen, and `Transitioning`
//! is the span of one [`TransitionJob`]. Covers that arrive while a job is rendering are kept
//! in a one-slot pending buffer and handled once the job completes, so two animations never
//! write to the sink at the same time.

use std::{sync::Arc, time::Duration};

use rand::{SeedableRng, rngs::StdRng};

use crate::{
    ambient::AmbientDispatcher,
    clock::{ClockTime, render_clock},
    engine::{
        FramePacer, NoPacer, SleepPacer, TransitionJob, TransitionOutcome, present,
        run_transition, show_grid,
    },
    foundation::{
        core::{Fps, PixelGrid},
        error::CoverResult,
    },
    quantize::AmbientColorPair,
    resolve::CoverIdentity,
    settings::{ChangeSet, SettingsStore},
    sink::PixelSink,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayState {
    #[default]
    Idle,
    Showing,
    Transitioning,
}

#[derive(Clone, Debug)]
pub enum DisplayInput {
    /// A freshly decoded cover to bring on screen.
    Cover {
        identity: CoverIdentity,
        grid: Arc<PixelGrid>,
    },
    /// Playback has stopped for the whole settle delay.
    NothingPlaying,
    SettingsChanged(ChangeSet),
}

/// Waits between transition frames and hands back display input that arrived meanwhile.
pub trait InputPacer {
    fn wait(&mut self, delay: Duration) -> Vec<DisplayInput>;
}

impl InputPacer for SleepPacer {
    fn wait(&mut self, delay: Duration) -> Vec<DisplayInput> {
        FramePacer::wait(self, delay);
        Vec::new()
    }
}

impl InputPacer for NoPacer {
    fn wait(&mut self, _delay: Duration) -> Vec<DisplayInput> {
        Vec::new()
    }
}

/// Routes input received mid-transition: covers into the pending slot, settings into a flag.
struct Interleave<'a> {
    inner: &'a mut dyn InputPacer,
    pending: &'a mut Option<DisplayInput>,
    clock_stale: &'a mut bool,
}

impl FramePacer for Interleave<'_> {
    fn wait(&mut self, delay: Duration) {
        for input in self.inner.wait(delay) {
            match input {
                DisplayInput::SettingsChanged(changes) => *self.clock_stale |= changes.clock,
                other => {
                    if self.pending.replace(other).is_some() {
                        tracing::debug!("pending display input superseded");
                    }
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DisplayOptions {
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            fps: Fps::default(),
        }
    }
}

type TimeSource = Box<dyn Fn() -> ClockTime + Send>;

pub struct DisplayMachine {
    sink: Box<dyn PixelSink>,
    settings: SettingsStore,
    ambient: Option<AmbientDispatcher>,
    opts: DisplayOptions,
    state: DisplayState,
    current: Option<Arc<PixelGrid>>,
    cover: Option<CoverIdentity>,
    pending: Option<DisplayInput>,
    clock_visible: bool,
    clock_stale: bool,
    time_source: TimeSource,
    rng: StdRng,
}

impl DisplayMachine {
    pub fn new(sink: Box<dyn PixelSink>, settings: SettingsStore, opts: DisplayOptions) -> Self {
        Self {
            sink,
            settings,
            ambient: None,
            opts,
            state: DisplayState::Idle,
            current: None,
            cover: None,
            pending: None,
            clock_visible: false,
            clock_stale: false,
            time_source: Box::new(ClockTime::now),
            rng: StdRng::seed_from_u64(rand::random()),
        }
    }

    pub fn with_ambient(mut self, ambient: AmbientDispatcher) -> Self {
        self.ambient = Some(ambient);
        self
    }

    pub fn with_time_source(mut self, source: impl Fn() -> ClockTime + Send + 'static) -> Self {
        self.time_source = Box::new(source);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    pub fn current_cover(&self) -> Option<&CoverIdentity> {
        self.cover.as_ref()
    }

    pub fn clock_visible(&self) -> bool {
        self.clock_visible
    }

    /// No hardware behind the sink.
    pub fn is_preview(&self) -> bool {
        !self.sink.is_attached()
    }

    pub fn ambient_pair(&self) -> Option<AmbientColorPair> {
        self.ambient.as_ref().and_then(AmbientDispatcher::last_pair)
    }

    pub fn ambient_devices(&self) -> Vec<String> {
        self.ambient
            .as_ref()
            .map(|a| a.device_names().to_vec())
            .unwrap_or_default()
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Blank the sink and enter `Idle`, starting the clock when enabled.
    pub fn start(&mut self) {
        if self.is_preview() {
            tracing::info!("no display attached, running in preview mode");
        }
        self.sink.clear();
        present(self.sink.as_mut(), self.settings.brightness());
        self.state = DisplayState::Idle;
        self.sync_clock();
    }

    /// Act on `input`, then on whatever became pending while it was rendering.
    pub fn handle(&mut self, input: DisplayInput, pacer: &mut dyn InputPacer) {
        let mut next = Some(input);
        while let Some(input) = next {
            match input {
                DisplayInput::Cover { identity, grid } => self.show_cover(identity, grid, pacer),
                DisplayInput::NothingPlaying => self.turn_off(pacer),
                DisplayInput::SettingsChanged(changes) => self.settings_changed(changes),
            }
            next = self.pending.take();
        }
        if std::mem::take(&mut self.clock_stale) {
            self.sync_clock();
        }
    }

    /// Redraw the clock if it currently owns the sink.
    pub fn tick_clock(&mut self) {
        if self.clock_visible && self.state == DisplayState::Idle {
            self.draw_clock();
        }
    }

    /// Blank the hardware before the process exits.
    pub fn shutdown(&mut self) {
        self.clock_visible = false;
        self.sink.clear();
        present(self.sink.as_mut(), self.settings.brightness());
        tracing::info!("display cleared");
    }

    fn show_cover(
        &mut self,
        identity: CoverIdentity,
        grid: Arc<PixelGrid>,
        pacer: &mut dyn InputPacer,
    ) {
        if self.clock_visible {
            self.clock_visible = false;
            tracing::debug!("clock stopped");
        }
        let settings = self.settings.get();
        if let Some(ambient) = &self.ambient {
            ambient.dispatch_colors(Arc::clone(&grid), settings.ambient_colors);
        }

        let job = TransitionJob::cover_change(
            self.current.clone(),
            Arc::clone(&grid),
            settings.transition,
            settings.transition_duration(),
            self.opts.fps,
        );
        self.state = DisplayState::Transitioning;
        if let Err(e) = self.run_job(&job, pacer) {
            tracing::warn!(error = %e, "transition failed, showing cover directly");
            show_grid(self.sink.as_mut(), &grid, self.settings.brightness());
        }

        tracing::info!(entity = %identity.entity, url = %identity.url, "showing cover");
        self.current = Some(grid);
        self.cover = Some(identity);
        self.state = DisplayState::Showing;
    }

    fn turn_off(&mut self, pacer: &mut dyn InputPacer) {
        if let Some(source) = self.current.take() {
            let job = TransitionJob::fade_out(
                source,
                self.settings.get().transition_duration(),
                self.opts.fps,
            );
            self.state = DisplayState::Transitioning;
            if let Err(e) = self.run_job(&job, pacer) {
                tracing::warn!(error = %e, "fade-out failed");
            }
        }
        if let Some(ambient) = &self.ambient {
            ambient.turn_off();
        }
        self.sink.clear();
        present(self.sink.as_mut(), self.settings.brightness());
        self.cover = None;
        self.state = DisplayState::Idle;
        tracing::info!("display idle");
        self.sync_clock();
    }

    fn run_job(
        &mut self,
        job: &TransitionJob,
        pacer: &mut dyn InputPacer,
    ) -> CoverResult<TransitionOutcome> {
        let Self {
            sink,
            settings,
            pending,
            clock_stale,
            rng,
            ..
        } = self;
        let brightness = || settings.brightness();
        let mut interleave = Interleave {
            inner: pacer,
            pending,
            clock_stale,
        };
        run_transition(job, sink.as_mut(), &mut interleave, &brightness, rng)
    }

    fn settings_changed(&mut self, changes: ChangeSet) {
        if self.state == DisplayState::Transitioning {
            self.clock_stale |= changes.clock;
            return;
        }
        let redrawn = changes.clock && self.sync_clock();
        if changes.brightness && !redrawn {
            self.repaint();
        }
    }

    /// Start, restyle or stop the clock to match the settings; only ever effective in `Idle`.
    /// Returns whether a frame was presented.
    fn sync_clock(&mut self) -> bool {
        if self.state != DisplayState::Idle {
            return false;
        }
        if self.settings.get().show_clock {
            if !self.clock_visible {
                tracing::debug!("clock started");
            }
            self.clock_visible = true;
            self.draw_clock();
            true
        } else if self.clock_visible {
            self.clock_visible = false;
            self.sink.clear();
            present(self.sink.as_mut(), self.settings.brightness());
            tracing::debug!("clock stopped");
            true
        } else {
            false
        }
    }

    /// Redraw what is on screen with the current brightness, without animating.
    fn repaint(&mut self) {
        let brightness = self.settings.brightness();
        if self.state == DisplayState::Showing {
            if let Some(grid) = &self.current {
                show_grid(self.sink.as_mut(), grid, brightness);
                return;
            }
        }
        if self.clock_visible {
            self.draw_clock();
        } else {
            self.sink.clear();
            present(self.sink.as_mut(), brightness);
        }
    }

    fn draw_clock(&mut self) {
        let settings = self.settings.get();
        let frame = render_clock(
            (self.time_source)(),
            settings.clock_color,
            self.opts.width,
            self.opts.height,
        );
        show_grid(self.sink.as_mut(), &frame, settings.brightness);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::{
        foundation::core::Rgb8,
        settings::DisplaySettings,
        sink::{MemorySink, NullSink},
    };

    const NOON: ClockTime = ClockTime {
        hour: 12,
        minute: 0,
        second: 0,
    };

    fn store(show_clock: bool) -> SettingsStore {
        SettingsStore::new(
            DisplaySettings {
                show_clock,
                transition_duration: 100,
                brightness: 50,
                ..DisplaySettings::default()
            },
            None,
        )
    }

    fn machine(
        settings: &SettingsStore,
    ) -> (DisplayMachine, Arc<Mutex<MemorySink>>) {
        let sink = MemorySink::shared(8, 8);
        let m = DisplayMachine::new(
            Box::new(Arc::clone(&sink)),
            settings.clone(),
            DisplayOptions {
                width: 8,
                height: 8,
                fps: Fps::whole(30).unwrap(),
            },
        )
        .with_time_source(|| NOON)
        .with_seed(3);
        (m, sink)
    }

    fn cover(url: &str, color: Rgb8) -> DisplayInput {
        DisplayInput::Cover {
            identity: CoverIdentity {
                url: url.to_string(),
                entity: "media_player.a".to_string(),
            },
            grid: Arc::new(PixelGrid::filled(8, 8, color)),
        }
    }

    /// Returns scripted input on the n-th wait.
    struct Script {
        waits: usize,
        steps: Vec<(usize, Step)>,
    }

    type Step = Box<dyn FnMut() -> Vec<DisplayInput>>;

    fn at(wait: usize, f: impl FnMut() -> Vec<DisplayInput> + 'static) -> (usize, Step) {
        (wait, Box::new(f))
    }

    impl InputPacer for Script {
        fn wait(&mut self, _delay: Duration) -> Vec<DisplayInput> {
            self.waits += 1;
            let mut out = Vec::new();
            for (at, step) in &mut self.steps {
                if *at == self.waits {
                    out.extend(step());
                }
            }
            out
        }
    }

    #[test]
    fn first_cover_goes_idle_to_showing() {
        let settings = store(true);
        let (mut m, sink) = machine(&settings);
        m.start();
        assert!(m.clock_visible());

        let red = Rgb8::new(200, 0, 0);
        m.handle(cover("a.png", red), &mut NoPacer);
        assert_eq!(m.state(), DisplayState::Showing);
        assert!(!m.clock_visible());
        assert_eq!(m.current_cover().map(|c| c.url.as_str()), Some("a.png"));

        let sink = sink.lock().unwrap();
        let last = sink.last_frame().unwrap();
        assert!(last.grid.pixels().iter().all(|p| *p == red));
        assert_eq!(last.brightness, 50);
    }

    #[test]
    fn nothing_playing_fades_to_black_and_starts_clock() {
        let settings = store(true);
        let (mut m, sink) = machine(&settings);
        m.start();
        m.handle(cover("a.png", Rgb8::new(0, 200, 0)), &mut NoPacer);
        sink.lock().unwrap().take_frames();

        m.handle(DisplayInput::NothingPlaying, &mut NoPacer);
        assert_eq!(m.state(), DisplayState::Idle);
        assert!(m.clock_visible());
        assert!(m.current_cover().is_none());

        let frames = sink.lock().unwrap().take_frames();
        // 4 fade frames, the blank, then the clock
        assert_eq!(frames.len(), 4 + 1 + 1);
        assert!(frames[3].grid.is_black());
        let clock = render_clock(NOON, DisplaySettings::default().clock_color, 8, 8);
        assert_eq!(frames.last().unwrap().grid, clock);
    }

    #[test]
    fn cover_arriving_mid_transition_waits_its_turn() {
        let settings = store(false);
        let (mut m, sink) = machine(&settings);
        m.start();
        let blue = Rgb8::new(0, 0, 255);
        let mut script = Script {
            waits: 0,
            steps: vec![at(1, move || vec![cover("b.png", blue)])],
        };
        m.handle(cover("a.png", Rgb8::new(255, 0, 0)), &mut script);

        assert_eq!(m.current_cover().map(|c| c.url.as_str()), Some("b.png"));
        assert_eq!(m.state(), DisplayState::Showing);
        let sink = sink.lock().unwrap();
        // blank + two full transitions of 4 frames each
        assert_eq!(sink.frames().len(), 1 + 4 + 4);
        assert!(sink.last_frame().unwrap().grid.pixels().iter().all(|p| *p == blue));
    }

    #[test]
    fn brightness_change_mid_transition_applies_on_next_present() {
        let settings = store(false);
        let (mut m, sink) = machine(&settings);
        m.start();
        sink.lock().unwrap().take_frames();

        let writer = settings.clone();
        let mut script = Script {
            waits: 0,
            steps: vec![at(2, move || {
                let out = writer.apply(&json!({ "brightness": 90 })).unwrap();
                vec![DisplayInput::SettingsChanged(out.changed)]
            })],
        };
        m.handle(cover("a.png", Rgb8::new(9, 9, 9)), &mut script);

        let frames = sink.lock().unwrap().take_frames();
        let levels: Vec<u8> = frames.iter().map(|f| f.brightness).collect();
        assert_eq!(levels, vec![50, 50, 90, 90]);
    }

    #[test]
    fn brightness_change_while_showing_repaints_once() {
        let settings = store(false);
        let (mut m, sink) = machine(&settings);
        m.start();
        m.handle(cover("a.png", Rgb8::new(1, 2, 3)), &mut NoPacer);
        sink.lock().unwrap().take_frames();

        let out = settings.apply(&json!({ "brightness": 10 })).unwrap();
        m.handle(DisplayInput::SettingsChanged(out.changed), &mut NoPacer);
        let frames = sink.lock().unwrap().take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].brightness, 10);
        assert!(frames[0].grid.pixels().iter().all(|p| *p == Rgb8::new(1, 2, 3)));
    }

    #[test]
    fn brightness_and_clock_colour_together_still_repaint_the_cover() {
        let settings = store(true);
        let (mut m, sink) = machine(&settings);
        m.start();
        m.handle(cover("a.png", Rgb8::new(4, 5, 6)), &mut NoPacer);
        sink.lock().unwrap().take_frames();

        let out = settings
            .apply(&json!({ "brightness": 10, "clockColor": "#ff0000" }))
            .unwrap();
        assert!(out.changed.brightness && out.changed.clock);
        m.handle(DisplayInput::SettingsChanged(out.changed), &mut NoPacer);

        assert_eq!(m.state(), DisplayState::Showing);
        let frames = sink.lock().unwrap().take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].brightness, 10);
        assert!(frames[0].grid.pixels().iter().all(|p| *p == Rgb8::new(4, 5, 6)));
    }

    #[test]
    fn brightness_and_clock_colour_in_idle_draw_the_clock_once() {
        let settings = store(true);
        let (mut m, sink) = machine(&settings);
        m.start();
        sink.lock().unwrap().take_frames();

        let out = settings
            .apply(&json!({ "brightness": 20, "clockColor": "#00ff00" }))
            .unwrap();
        m.handle(DisplayInput::SettingsChanged(out.changed), &mut NoPacer);
        let frames = sink.lock().unwrap().take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].brightness, 20);
        assert_eq!(frames[0].grid, render_clock(NOON, Rgb8::new(0, 255, 0), 8, 8));
    }

    #[test]
    fn clock_toggle_mid_transition_takes_effect_at_idle() {
        let settings = store(true);
        let (mut m, _sink) = machine(&settings);
        m.start();
        m.handle(cover("a.png", Rgb8::new(5, 5, 5)), &mut NoPacer);

        let writer = settings.clone();
        let mut script = Script {
            waits: 0,
            steps: vec![at(1, move || {
                let out = writer.apply(&json!({ "showClock": false })).unwrap();
                vec![DisplayInput::SettingsChanged(out.changed)]
            })],
        };
        m.handle(DisplayInput::NothingPlaying, &mut script);
        assert_eq!(m.state(), DisplayState::Idle);
        assert!(!m.clock_visible());

        let out = settings.apply(&json!({ "showClock": true })).unwrap();
        m.handle(DisplayInput::SettingsChanged(out.changed), &mut NoPacer);
        assert!(m.clock_visible());
    }

    #[test]
    fn absent_hardware_still_walks_every_state() {
        let settings = store(true);
        let mut m = DisplayMachine::new(Box::new(NullSink), settings, DisplayOptions::default())
            .with_time_source(|| NOON);
        m.start();
        assert!(m.is_preview());
        let grid = Arc::new(PixelGrid::filled(64, 64, Rgb8::new(3, 3, 3)));
        m.handle(
            DisplayInput::Cover {
                identity: CoverIdentity {
                    url: "x".into(),
                    entity: "e".into(),
                },
                grid,
            },
            &mut NoPacer,
        );
        assert_eq!(m.state(), DisplayState::Showing);
        m.handle(DisplayInput::NothingPlaying, &mut NoPacer);
        assert_eq!(m.state(), DisplayState::Idle);
        m.tick_clock();
        m.shutdown();
    }

    #[test]
    fn shutdown_blanks_the_sink() {
        let settings = store(false);
        let (mut m, sink) = machine(&settings);
        m.start();
        m.handle(cover("a.png", Rgb8::new(70, 70, 70)), &mut NoPacer);
        m.shutdown();
        let sink = sink.lock().unwrap();
        assert!(sink.last_frame().unwrap().grid.is_black());
    }
}
