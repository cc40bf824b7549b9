use std::{
    io::Write as _,
    process::{Child, ChildStdin, Command, Stdio},
    sync::{Arc, Mutex},
};

use crate::foundation::{
    core::{PixelGrid, Rgb8},
    error::{CoverError, CoverResult},
};

pub trait PixelSink: Send {
    fn set_pixel(&mut self, x: u32, y: u32, color: Rgb8);

    /// Show everything written since the previous present.
    fn present(&mut self);

    fn clear(&mut self);

    /// Brightness in percent, 0-100.
    fn set_brightness(&mut self, brightness: u8);

    /// `false` when no hardware is behind this sink (preview mode).
    fn is_attached(&self) -> bool {
        true
    }
}

/// Write a whole grid into the sink's back buffer (does not present).
pub fn draw_grid(sink: &mut dyn PixelSink, grid: &PixelGrid) {
    for y in 0..grid.height() {
        for x in 0..grid.width() {
            sink.set_pixel(x, y, grid.get(x, y));
        }
    }
}

impl<S: PixelSink + ?Sized> PixelSink for Box<S> {
    fn set_pixel(&mut self, x: u32, y: u32, color: Rgb8) {
        (**self).set_pixel(x, y, color);
    }

    fn present(&mut self) {
        (**self).present();
    }

    fn clear(&mut self) {
        (**self).clear();
    }

    fn set_brightness(&mut self, brightness: u8) {
        (**self).set_brightness(brightness);
    }

    fn is_attached(&self) -> bool {
        (**self).is_attached()
    }
}

/// Lets a caller keep a handle on a sink that has been handed to the controller.
impl<S: PixelSink> PixelSink for Arc<Mutex<S>> {
    fn set_pixel(&mut self, x: u32, y: u32, color: Rgb8) {
        lock(self).set_pixel(x, y, color);
    }

    fn present(&mut self) {
        lock(self).present();
    }

    fn clear(&mut self) {
        lock(self).clear();
    }

    fn set_brightness(&mut self, brightness: u8) {
        lock(self).set_brightness(brightness);
    }

    fn is_attached(&self) -> bool {
        lock(self).is_attached()
    }
}

fn lock<S>(m: &Mutex<S>) -> std::sync::MutexGuard<'_, S> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl PixelSink for NullSink {
    fn set_pixel(&mut self, _x: u32, _y: u32, _color: Rgb8) {}

    fn present(&mut self) {}

    fn clear(&mut self) {}

    fn set_brightness(&mut self, _brightness: u8) {}

    fn is_attached(&self) -> bool {
        false
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresentedFrame {
    pub grid: PixelGrid,
    pub brightness: u8,
}

/// Framebuffer in memory; every `present()` is recorded.
#[derive(Clone, Debug)]
pub struct MemorySink {
    back: PixelGrid,
    brightness: u8,
    presented: Vec<PresentedFrame>,
    clears: usize,
}

impl MemorySink {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            back: PixelGrid::new(width, height),
            brightness: 100,
            presented: Vec::new(),
            clears: 0,
        }
    }

    pub fn shared(width: u32, height: u32) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::new(width, height)))
    }

    pub fn frames(&self) -> &[PresentedFrame] {
        &self.presented
    }

    pub fn take_frames(&mut self) -> Vec<PresentedFrame> {
        std::mem::take(&mut self.presented)
    }

    pub fn last_frame(&self) -> Option<&PresentedFrame> {
        self.presented.last()
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn clear_count(&self) -> usize {
        self.clears
    }
}

impl PixelSink for MemorySink {
    fn set_pixel(&mut self, x: u32, y: u32, color: Rgb8) {
        self.back.set(x, y, color);
    }

    fn present(&mut self) {
        self.presented.push(PresentedFrame {
            grid: self.back.clone(),
            brightness: self.brightness,
        });
    }

    fn clear(&mut self) {
        self.back.fill(Rgb8::BLACK);
        self.clears += 1;
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness.min(100);
    }
}

/// Streams raw RGB24 frames to an external matrix driver over its stdin.
///
/// Brightness is applied in software before each frame is written.
pub struct PipeSink {
    back: PixelGrid,
    brightness: u8,
    child: Child,
    stdin: Option<ChildStdin>,
    scratch: Vec<u8>,
}

impl PipeSink {
    pub fn spawn(argv: &[String], width: u32, height: u32) -> CoverResult<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CoverError::device("display command must not be empty"))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| CoverError::device(format!("failed to spawn '{program}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CoverError::device("failed to open display command stdin"))?;

        Ok(Self {
            back: PixelGrid::new(width, height),
            brightness: 100,
            child,
            stdin: Some(stdin),
            scratch: Vec::with_capacity((width * height * 3) as usize),
        })
    }
}

impl PixelSink for PipeSink {
    fn set_pixel(&mut self, x: u32, y: u32, color: Rgb8) {
        self.back.set(x, y, color);
    }

    fn present(&mut self) {
        let Some(stdin) = self.stdin.as_mut() else {
            return;
        };
        self.scratch.clear();
        for p in self.back.pixels() {
            let p = p.apply_brightness(self.brightness);
            self.scratch.extend_from_slice(&[p.r, p.g, p.b]);
        }
        if let Err(e) = stdin.write_all(&self.scratch).and_then(|_| stdin.flush()) {
            tracing::warn!(error = %e, "display command stopped accepting frames, switching to preview");
            self.stdin = None;
        }
    }

    fn clear(&mut self) {
        self.back.fill(Rgb8::BLACK);
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness.min(100);
    }

    fn is_attached(&self) -> bool {
        self.stdin.is_some()
    }
}

impl Drop for PipeSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Err(e) = self.child.wait() {
            tracing::debug!(error = %e, "display command did not exit cleanly");
        }
    }
}

/// Open the configured driver, or fall back to preview mode when it is missing or fails.
pub fn open_sink(command: Option<&[String]>, width: u32, height: u32) -> Box<dyn PixelSink> {
    match command {
        None => {
            tracing::info!("no display command configured, running in preview mode");
            Box::new(NullSink)
        }
        Some(argv) => match PipeSink::spawn(argv, width, height) {
            Ok(sink) => {
                tracing::info!(command = ?argv, "display command started");
                Box::new(sink)
            }
            Err(e) => {
                tracing::warn!(error = %e, "display unavailable, running in preview mode");
                Box::new(NullSink)
            }
        },
    }
}
