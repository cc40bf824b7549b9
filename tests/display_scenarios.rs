use std::{
    collections::HashMap,
    io::Cursor,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use rgb_cover::{
    ArtworkFetcher, ArtworkLoader, ClockTime, Controller, ControllerThread, CoverError,
    CoverIdentity, CoverResolver, CoverResult, DisplayInput, DisplayMachine, DisplayOptions,
    DisplaySettings, DisplayState, DisplayStatus, EntitySnapshot, Fps, InputPacer, MediaEntity,
    MemorySink, NoPacer, NullSink, PixelGrid, PixelSink, Resample, ResolverTiming, Rgb8,
    SettingsStore,
};
use serde_json::json;

struct CountingFetcher {
    images: HashMap<String, Vec<u8>>,
    calls: Arc<AtomicUsize>,
}

impl ArtworkFetcher for CountingFetcher {
    fn fetch(&self, reference: &str) -> CoverResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.images
            .get(reference)
            .cloned()
            .ok_or_else(|| CoverError::fetch(format!("no such image {reference}")))
    }
}

fn png(color: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb(color));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn spawn(
    sink: Box<dyn PixelSink>,
    transition_ms: u64,
    calls: Arc<AtomicUsize>,
) -> ControllerThread {
    let settings = SettingsStore::new(
        DisplaySettings {
            show_clock: false,
            transition_duration: transition_ms,
            ..DisplaySettings::default()
        },
        None,
    );
    let display = DisplayMachine::new(
        sink,
        settings,
        DisplayOptions {
            width: 8,
            height: 8,
            fps: Fps::whole(30).unwrap(),
        },
    );
    let fetcher = CountingFetcher {
        images: HashMap::from([
            ("art1".to_string(), png([255, 0, 0])),
            ("art2".to_string(), png([0, 0, 255])),
        ]),
        calls,
    };
    let loader = ArtworkLoader::new(Arc::new(fetcher), 8, 8, Resample::Nearest);
    let resolver = CoverResolver::new(
        vec!["B".into(), "A".into()],
        None,
        ResolverTiming {
            debounce: Duration::from_millis(20),
            settle: Duration::from_millis(50),
        },
    );
    Controller::spawn(display, loader, resolver).unwrap()
}

fn wait_for(ctl: &ControllerThread, pred: impl Fn(&DisplayStatus) -> bool) -> DisplayStatus {
    let handle = ctl.handle();
    for _ in 0..1000 {
        let status = handle.status();
        if pred(&status) {
            return status;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("condition never reached, last status {:?}", handle.status());
}

fn snap(entries: &[(&str, MediaEntity)]) -> EntitySnapshot {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn duplicate_covers_are_fetched_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = MemorySink::shared(8, 8);
    let ctl = spawn(Box::new(Arc::clone(&sink)), 60, Arc::clone(&calls));
    let handle = ctl.handle();

    handle.submit_snapshot(snap(&[
        ("A", MediaEntity::idle()),
        ("B", MediaEntity::playing("art1")),
    ]));
    wait_for(&ctl, |s| {
        s.state == DisplayState::Showing && s.current_cover.as_deref() == Some("art1")
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    handle.submit_snapshot(snap(&[
        ("A", MediaEntity::playing("art2")),
        ("B", MediaEntity::playing("art1")),
    ]));
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    handle.submit_snapshot(snap(&[
        ("A", MediaEntity::playing("art2")),
        ("B", MediaEntity::idle()),
    ]));
    let status = wait_for(&ctl, |s| {
        s.state == DisplayState::Showing && s.current_cover.as_deref() == Some("art2")
    });
    assert_eq!(status.current_entity.as_deref(), Some("A"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    handle.shutdown();
    ctl.join().unwrap();
    let sink = sink.lock().unwrap();
    assert!(sink.last_frame().unwrap().grid.is_black());
}

#[test]
fn cover_change_during_a_transition_is_shown_afterwards() {
    let calls = Arc::new(AtomicUsize::new(0));
    let ctl = spawn(Box::new(NullSink), 300, Arc::clone(&calls));
    let handle = ctl.handle();

    handle.submit_snapshot(snap(&[("B", MediaEntity::playing("art1"))]));
    let status = wait_for(&ctl, |s| s.state == DisplayState::Transitioning);
    assert!(status.preview);

    handle.submit_snapshot(snap(&[("B", MediaEntity::playing("art2"))]));
    wait_for(&ctl, |s| {
        s.state == DisplayState::Showing && s.current_cover.as_deref() == Some("art2")
    });
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    handle.shutdown();
    ctl.join().unwrap();
}

#[test]
fn absent_hardware_runs_every_state_without_errors() {
    let calls = Arc::new(AtomicUsize::new(0));
    let ctl = spawn(Box::new(NullSink), 60, calls);
    let handle = ctl.handle();

    let status = wait_for(&ctl, |s| s.preview);
    assert_eq!(status.state, DisplayState::Idle);

    handle.submit_snapshot(snap(&[("A", MediaEntity::playing("art1"))]));
    wait_for(&ctl, |s| s.state == DisplayState::Showing);

    let out = handle
        .apply_settings(&json!({ "brightness": 30, "showClock": true }))
        .unwrap();
    assert!(out.rejected.is_empty());
    handle.request_refresh();

    handle.submit_snapshot(snap(&[("A", MediaEntity::idle())]));
    let status = wait_for(&ctl, |s| s.state == DisplayState::Idle && s.clock_visible);
    assert!(!status.is_playing);
    assert_eq!(status.settings.brightness, 30);

    handle.shutdown();
    ctl.join().unwrap();
}

/// Changes brightness through the store after the given number of frame waits.
struct BrightnessAt {
    waits: usize,
    at: usize,
    store: SettingsStore,
}

impl InputPacer for BrightnessAt {
    fn wait(&mut self, _delay: Duration) -> Vec<DisplayInput> {
        self.waits += 1;
        if self.waits != self.at {
            return Vec::new();
        }
        let out = self.store.apply(&json!({ "brightness": 15 })).unwrap();
        vec![DisplayInput::SettingsChanged(out.changed)]
    }
}

#[test]
fn brightness_change_mid_transition_does_not_restart_it() {
    let store = SettingsStore::new(
        DisplaySettings {
            show_clock: false,
            brightness: 80,
            transition_duration: 1000,
            ..DisplaySettings::default()
        },
        None,
    );
    let sink = MemorySink::shared(8, 8);
    let mut display = DisplayMachine::new(
        Box::new(Arc::clone(&sink)),
        store.clone(),
        DisplayOptions {
            width: 8,
            height: 8,
            fps: Fps::whole(10).unwrap(),
        },
    )
    .with_time_source(|| ClockTime {
        hour: 9,
        minute: 41,
        second: 0,
    });
    display.start();
    sink.lock().unwrap().take_frames();

    let target = Arc::new(PixelGrid::filled(8, 8, Rgb8::new(0, 255, 0)));
    let mut pacer = BrightnessAt {
        waits: 0,
        at: 4,
        store: store.clone(),
    };
    display.handle(
        DisplayInput::Cover {
            identity: CoverIdentity {
                url: "art".into(),
                entity: "A".into(),
            },
            grid: Arc::clone(&target),
        },
        &mut pacer,
    );

    let frames = sink.lock().unwrap().take_frames();
    assert_eq!(frames.len(), 11);
    let levels: Vec<u8> = frames.iter().map(|f| f.brightness).collect();
    assert_eq!(&levels[..4], &[80, 80, 80, 80]);
    assert!(levels[4..].iter().all(|b| *b == 15));
    assert_eq!(frames.last().unwrap().grid, *target);
    assert_eq!(display.state(), DisplayState::Showing);

    display.handle(DisplayInput::NothingPlaying, &mut NoPacer);
    assert_eq!(display.state(), DisplayState::Idle);
}

#[test]
fn shutdown_from_another_thread_blanks_a_showing_display() {
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = MemorySink::shared(8, 8);
    let ctl = spawn(Box::new(Arc::clone(&sink)), 30, calls);
    let source = ctl.handle();

    source.submit_snapshot(snap(&[("B", MediaEntity::playing("art1"))]));
    wait_for(&ctl, |s| s.state == DisplayState::Showing);

    // The source handle stays alive, as a poller's would, so only the request ends the loop.
    let signal = ctl.handle();
    std::thread::spawn(move || signal.shutdown()).join().unwrap();
    ctl.join().unwrap();

    assert!(!source.submit_snapshot(snap(&[("B", MediaEntity::playing("art2"))])));
    let sink = sink.lock().unwrap();
    assert!(sink.last_frame().unwrap().grid.is_black());
}
