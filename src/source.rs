use std::{
    io::BufRead,
    thread::JoinHandle,
    time::Duration,
};

use crate::{
    control::ControlHandle,
    foundation::error::{CoverError, CoverResult},
    resolve::{EntitySnapshot, MediaEntity, PlaybackState},
};

#[derive(serde::Deserialize)]
struct HassState {
    state: String,
    #[serde(default)]
    attributes: HassAttributes,
}

#[derive(Default, serde::Deserialize)]
struct HassAttributes {
    entity_picture: Option<String>,
}

/// Parse one `/api/states/<entity>` response body.
pub fn parse_hass_state(body: &str) -> CoverResult<MediaEntity> {
    let raw: HassState = serde_json::from_str(body)?;
    Ok(MediaEntity {
        state: PlaybackState::from(raw.state.as_str()),
        artwork: raw.attributes.entity_picture.filter(|p| !p.is_empty()),
    })
}

/// Polls the Home Assistant REST API for every configured media player.
pub struct HassPoller {
    base_url: String,
    token: Option<String>,
    entities: Vec<String>,
    interval: Duration,
    agent: ureq::Agent,
    /// Last successful answer per entity; reused while the entity cannot be reached.
    last_known: EntitySnapshot,
}

impl HassPoller {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        entities: Vec<String>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            entities,
            interval,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            last_known: EntitySnapshot::new(),
        }
    }

    pub fn state_url(&self, entity: &str) -> String {
        format!("{}/api/states/{entity}", self.base_url)
    }

    pub fn fetch_entity(&self, entity: &str) -> CoverResult<MediaEntity> {
        let url = self.state_url(entity);
        let mut req = self.agent.get(&url);
        if let Some(token) = &self.token {
            req = req.set("Authorization", &format!("Bearer {token}"));
        }
        let body = req
            .call()
            .map_err(|e| CoverError::fetch(format!("GET {url}: {e}")))?
            .into_string()
            .map_err(|e| CoverError::fetch(format!("reading {url}: {e}")))?;
        parse_hass_state(&body)
    }

    /// Poll every entity once. An entity that cannot be reached keeps its last known state,
    /// so an outage never reads as playback stopping. Entities never reached are left out.
    pub fn snapshot(&mut self) -> EntitySnapshot {
        for entity in &self.entities {
            match self.fetch_entity(entity) {
                Ok(state) => {
                    self.last_known.insert(entity.clone(), state);
                }
                Err(e) => tracing::debug!(%entity, error = %e, "entity unavailable, keeping last state"),
            }
        }
        self.last_known.clone()
    }

    /// Poll until the controller stops. Only snapshots that differ from the previous one are
    /// submitted, so steady polling never keeps restarting the debounce window.
    pub fn spawn(mut self, handle: ControlHandle) -> CoverResult<JoinHandle<()>> {
        let thread = std::thread::Builder::new()
            .name("hass-poller".to_string())
            .spawn(move || {
                tracing::info!(url = %self.base_url, entities = self.entities.len(), "polling home assistant");
                let mut previous: Option<EntitySnapshot> = None;
                loop {
                    let snapshot = self.snapshot();
                    if previous.as_ref() != Some(&snapshot) {
                        if !handle.submit_snapshot(snapshot.clone()) {
                            break;
                        }
                        previous = Some(snapshot);
                    }
                    std::thread::sleep(self.interval);
                }
            })?;
        Ok(thread)
    }
}

/// Reads one JSON snapshot per line, e.g. `{"media_player.tv": {"state": "playing", "artwork": "..."}}`.
pub struct JsonLinesSource<R> {
    reader: R,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Blank lines yield `None`.
    pub fn parse_line(line: &str) -> CoverResult<Option<EntitySnapshot>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(line)?))
    }

    /// Forward snapshots until EOF or until the controller stops. Returns how many were sent.
    pub fn run(mut self, handle: &ControlHandle) -> CoverResult<usize> {
        let mut sent = 0;
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                break;
            }
            match Self::parse_line(&line) {
                Ok(Some(snapshot)) => {
                    if !handle.submit_snapshot(snapshot) {
                        break;
                    }
                    sent += 1;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "skipping malformed snapshot line"),
            }
        }
        Ok(sent)
    }
}

impl<R: BufRead + Send + 'static> JsonLinesSource<R> {
    /// Run on a thread; at EOF the controller is asked to shut down when `shutdown_on_eof`.
    pub fn spawn(self, handle: ControlHandle, shutdown_on_eof: bool) -> CoverResult<JoinHandle<()>> {
        let thread = std::thread::Builder::new()
            .name("json-lines".to_string())
            .spawn(move || {
                match self.run(&handle) {
                    Ok(sent) => tracing::info!(sent, "snapshot input closed"),
                    Err(e) => tracing::error!(error = %e, "snapshot input failed"),
                }
                if shutdown_on_eof {
                    handle.shutdown();
                }
            })?;
        Ok(thread)
    }
}
