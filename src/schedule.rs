use std::time::{Duration, Instant};

/// Trailing-edge debounce: only the last value submitted within the window survives.
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Replace any pending value and restart the window.
    pub fn submit(&mut self, value: T, now: Instant) {
        self.pending = Some((now + self.window, value));
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(due, _)| *due)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Take the pending value once its window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((due, _)) if *due <= now => self.pending.take().map(|(_, v)| v),
            _ => None,
        }
    }
}

/// A cancellable one-shot; scheduling again replaces the previous deadline.
#[derive(Clone, Debug)]
pub struct DelayedTask {
    delay: Duration,
    due: Option<Instant>,
}

impl DelayedTask {
    pub fn new(delay: Duration) -> Self {
        Self { delay, due: None }
    }

    pub fn schedule(&mut self, now: Instant) {
        self.due = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.due = None;
    }

    pub fn is_scheduled(&self) -> bool {
        self.due.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.due
    }

    /// `true` exactly once, when the deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.due {
            Some(due) if due <= now => {
                self.due = None;
                true
            }
            _ => false,
        }
    }
}

pub fn earliest(deadlines: impl IntoIterator<Item = Option<Instant>>) -> Option<Instant> {
    deadlines.into_iter().flatten().min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_keeps_only_the_last_value() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(500));
        d.submit(1, t0);
        d.submit(2, t0 + Duration::from_millis(300));
        assert_eq!(d.poll(t0 + Duration::from_millis(600)), None);
        assert_eq!(d.poll(t0 + Duration::from_millis(800)), Some(2));
        assert_eq!(d.poll(t0 + Duration::from_secs(5)), None);
    }

    #[test]
    fn delayed_task_fires_once_and_can_be_cancelled() {
        let t0 = Instant::now();
        let mut task = DelayedTask::new(Duration::from_secs(1));
        task.schedule(t0);
        assert!(!task.poll(t0 + Duration::from_millis(999)));
        assert!(task.poll(t0 + Duration::from_secs(1)));
        assert!(!task.poll(t0 + Duration::from_secs(2)));

        task.schedule(t0);
        task.cancel();
        assert!(!task.poll(t0 + Duration::from_secs(2)));
    }

    #[test]
    fn rescheduling_replaces_the_deadline() {
        let t0 = Instant::now();
        let mut task = DelayedTask::new(Duration::from_secs(1));
        task.schedule(t0);
        task.schedule(t0 + Duration::from_secs(3));
        assert!(!task.poll(t0 + Duration::from_secs(2)));
        assert_eq!(task.deadline(), Some(t0 + Duration::from_secs(4)));
    }

    #[test]
    fn earliest_ignores_missing_deadlines() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(1);
        assert_eq!(earliest([None, Some(t1), Some(t0)]), Some(t0));
        assert_eq!(earliest([None, None]), None);
    }
}
