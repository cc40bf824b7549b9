use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use crate::schedule::{DelayedTask, Debouncer, earliest};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    Playing,
    Other,
}

impl From<&str> for PlaybackState {
    fn from(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("playing") {
            PlaybackState::Playing
        } else {
            PlaybackState::Other
        }
    }
}

impl serde::Serialize for PlaybackState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            PlaybackState::Playing => "playing",
            PlaybackState::Other => "other",
        })
    }
}

impl<'de> serde::Deserialize<'de> for PlaybackState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(PlaybackState::from(s.as_str()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MediaEntity {
    pub state: PlaybackState,
    #[serde(default, alias = "entity_picture", skip_serializing_if = "Option::is_none")]
    pub artwork: Option<String>,
}

impl MediaEntity {
    pub fn playing(artwork: impl Into<String>) -> Self {
        Self {
            state: PlaybackState::Playing,
            artwork: Some(artwork.into()),
        }
    }

    pub fn idle() -> Self {
        Self {
            state: PlaybackState::Other,
            artwork: None,
        }
    }

    fn playing_artwork(&self) -> Option<&str> {
        match (self.state, self.artwork.as_deref()) {
            (PlaybackState::Playing, Some(art)) if !art.trim().is_empty() => Some(art),
            _ => None,
        }
    }
}

/// Full state of every known entity; each update replaces the previous snapshot entirely.
pub type EntitySnapshot = BTreeMap<String, MediaEntity>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverIdentity {
    /// Resolved artwork reference; the de-duplication key.
    pub url: String,
    pub entity: String,
}

impl CoverIdentity {
    pub fn same_cover(&self, other: &CoverIdentity) -> bool {
        self.url == other.url
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Playing(CoverIdentity),
    NothingPlaying,
}

/// First entity in `priority` order that is playing and has artwork wins.
///
/// Relative artwork references (starting with `/`) are prefixed with `base_url`.
pub fn resolve_cover(
    snapshot: &EntitySnapshot,
    priority: &[String],
    base_url: Option<&str>,
) -> Resolution {
    for slug in priority {
        let Some(art) = snapshot.get(slug).and_then(MediaEntity::playing_artwork) else {
            continue;
        };
        let url = match base_url {
            Some(base) if art.starts_with('/') => {
                format!("{}{}", base.trim_end_matches('/'), art)
            }
            _ => art.to_string(),
        };
        return Resolution::Playing(CoverIdentity {
            url,
            entity: slug.clone(),
        });
    }
    Resolution::NothingPlaying
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoverEvent {
    /// A new distinct cover should be fetched and shown.
    Changed(CoverIdentity),
    /// Nothing has been playing for the whole settle delay.
    NothingPlaying,
}

#[derive(Clone, Copy, Debug)]
pub struct ResolverTiming {
    pub debounce: Duration,
    pub settle: Duration,
}

impl Default for ResolverTiming {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            settle: Duration::from_millis(1000),
        }
    }
}

/// Turns a stream of snapshots into at most one [`CoverEvent`] per logical change.
#[derive(Debug)]
pub struct CoverResolver {
    priority: Vec<String>,
    base_url: Option<String>,
    debounce: Debouncer<EntitySnapshot>,
    settle: DelayedTask,
    /// Latest resolution; `None` while nothing is playing.
    active: Option<CoverIdentity>,
    /// Last cover announced with `Changed` and not yet retired by `NothingPlaying`.
    emitted: Option<CoverIdentity>,
    last_snapshot: Option<EntitySnapshot>,
}

impl CoverResolver {
    pub fn new(priority: Vec<String>, base_url: Option<String>, timing: ResolverTiming) -> Self {
        Self {
            priority,
            base_url,
            debounce: Debouncer::new(timing.debounce),
            settle: DelayedTask::new(timing.settle),
            active: None,
            emitted: None,
            last_snapshot: None,
        }
    }

    pub fn priority(&self) -> &[String] {
        &self.priority
    }

    /// Record a snapshot; it is only evaluated once the debounce window passes quietly.
    pub fn submit(&mut self, snapshot: EntitySnapshot, now: Instant) {
        self.debounce.submit(snapshot, now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([self.debounce.deadline(), self.settle.deadline()])
    }

    pub fn poll(&mut self, now: Instant) -> Option<CoverEvent> {
        if let Some(snapshot) = self.debounce.poll(now) {
            let resolution =
                resolve_cover(&snapshot, &self.priority, self.base_url.as_deref());
            self.last_snapshot = Some(snapshot);
            if let Some(event) = self.apply(resolution, now) {
                return Some(event);
            }
        }
        if self.settle.poll(now) {
            self.emitted = None;
            tracing::debug!("nothing playing after settle delay");
            return Some(CoverEvent::NothingPlaying);
        }
        None
    }

    fn apply(&mut self, resolution: Resolution, now: Instant) -> Option<CoverEvent> {
        match resolution {
            Resolution::Playing(identity) => {
                self.settle.cancel();
                self.active = Some(identity.clone());
                let unchanged = self
                    .emitted
                    .as_ref()
                    .is_some_and(|prev| prev.same_cover(&identity));
                self.emitted = Some(identity.clone());
                if unchanged {
                    None
                } else {
                    tracing::info!(entity = %identity.entity, url = %identity.url, "cover changed");
                    Some(CoverEvent::Changed(identity))
                }
            }
            Resolution::NothingPlaying => {
                let was_active = self.active.take().is_some();
                if was_active || (self.emitted.is_some() && !self.settle.is_scheduled()) {
                    self.settle.schedule(now);
                }
                None
            }
        }
    }

    /// Forget the last announced cover and re-evaluate the latest snapshot, so the current
    /// cover is fetched and shown again.
    pub fn refresh(&mut self, now: Instant) {
        self.emitted = None;
        if let Some(snapshot) = self.last_snapshot.clone() {
            if !self.debounce.is_pending() {
                self.debounce.submit(snapshot, now);
            }
        }
    }

    pub fn active(&self) -> Option<&CoverIdentity> {
        self.active.as_ref()
    }

    pub fn current_cover(&self) -> Option<&CoverIdentity> {
        self.emitted.as_ref()
    }

    pub fn is_current(&self, identity: &CoverIdentity) -> bool {
        self.emitted.as_ref().is_some_and(|e| e.same_cover(identity))
    }
}
