use std::{sync::Arc, time::Duration};

use rand::RngCore;

use crate::{
    composite::FrameCompositor,
    foundation::core::{Fps, PixelGrid},
    foundation::error::{CoverError, CoverResult},
    sink::{PixelSink, draw_grid},
    transitions::TransitionKind,
};

/// One bounded animation from `source` to `target`.
///
/// An absent source renders as black; an absent target is only valid for
/// [`TransitionKind::FadeOut`].
#[derive(Clone, Debug)]
pub struct TransitionJob {
    pub source: Option<Arc<PixelGrid>>,
    pub target: Option<Arc<PixelGrid>>,
    pub kind: TransitionKind,
    pub duration: Duration,
    pub fps: Fps,
}

impl TransitionJob {
    pub fn cover_change(
        source: Option<Arc<PixelGrid>>,
        target: Arc<PixelGrid>,
        kind: TransitionKind,
        duration: Duration,
        fps: Fps,
    ) -> Self {
        Self {
            source,
            target: Some(target),
            kind,
            duration,
            fps,
        }
    }

    pub fn fade_out(source: Arc<PixelGrid>, duration: Duration, fps: Fps) -> Self {
        Self {
            source: Some(source),
            target: None,
            kind: TransitionKind::FadeOut,
            duration,
            fps,
        }
    }

    pub fn validate(&self) -> CoverResult<()> {
        if self.duration.is_zero() {
            return Err(CoverError::validation("transition duration must be > 0"));
        }
        match (self.kind, &self.source, &self.target) {
            (TransitionKind::FadeOut, None, _) => Err(CoverError::validation(
                "fade-out needs a source grid",
            )),
            (TransitionKind::FadeOut, _, Some(_)) => Err(CoverError::validation(
                "fade-out must not have a target grid",
            )),
            (TransitionKind::FadeOut, Some(_), None) => Ok(()),
            (_, _, None) => Err(CoverError::validation(format!(
                "{} transition needs a target grid",
                self.kind
            ))),
            _ => Ok(()),
        }
    }

    /// `floor(duration_secs * fps)`, at least 1.
    pub fn frame_count(&self) -> u64 {
        self.fps
            .secs_to_frames_floor(self.duration.as_secs_f64())
            .max(1)
    }

    pub fn frame_delay(&self) -> Duration {
        let count = u32::try_from(self.frame_count()).unwrap_or(u32::MAX);
        self.duration / count
    }

    /// Progress of frame `frame` out of [`Self::frame_count`].
    pub fn progress(&self, frame: u64) -> f64 {
        let count = self.frame_count();
        (frame.min(count) as f64) / (count as f64)
    }
}

/// Suspends the frame loop between frames.
pub trait FramePacer {
    fn wait(&mut self, delay: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SleepPacer;

impl FramePacer for SleepPacer {
    fn wait(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Renders as fast as possible; for previews and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPacer;

impl FramePacer for NoPacer {
    fn wait(&mut self, _delay: Duration) {}
}

#[derive(Clone, Debug)]
pub struct TransitionOutcome {
    pub frames_presented: u64,
    /// The last frame written to the sink.
    pub final_frame: PixelGrid,
}

/// Apply the current brightness, then present.
pub fn present(sink: &mut dyn PixelSink, brightness: u8) {
    sink.set_brightness(brightness);
    sink.present();
}

/// Full repaint of `grid` without animation.
pub fn show_grid(sink: &mut dyn PixelSink, grid: &PixelGrid, brightness: u8) {
    draw_grid(sink, grid);
    present(sink, brightness);
}

/// Render `job` frame by frame into `sink`.
///
/// Frames `0..=frame_count` are presented; `brightness` is sampled before every present so a
/// setting changed mid-animation shows up on the next frame.
#[tracing::instrument(skip_all, fields(kind = %job.kind, duration_ms = job.duration.as_millis() as u64))]
pub fn run_transition(
    job: &TransitionJob,
    sink: &mut dyn PixelSink,
    pacer: &mut dyn FramePacer,
    brightness: &dyn Fn() -> u8,
    rng: &mut dyn RngCore,
) -> CoverResult<TransitionOutcome> {
    job.validate()?;
    let compositor =
        FrameCompositor::new(job.kind, job.source.clone(), job.target.clone(), rng)?;

    let count = job.frame_count();
    let delay = job.frame_delay();
    let mut frame_buf = PixelGrid::new(compositor.width(), compositor.height());

    for frame in 0..=count {
        compositor.render_into(job.progress(frame), &mut frame_buf);
        draw_grid(sink, &frame_buf);
        present(sink, brightness());
        if frame < count {
            pacer.wait(delay);
        }
    }

    tracing::debug!(frames = count + 1, "transition finished");
    Ok(TransitionOutcome {
        frames_presented: count + 1,
        final_frame: frame_buf,
    })
}
