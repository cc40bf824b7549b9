use std::sync::{Arc, RwLock, mpsc::Sender};

use serde_json::Value;

use crate::{
    controller::Command,
    display::DisplayState,
    foundation::error::{CoverError, CoverResult},
    quantize::AmbientColorPair,
    resolve::EntitySnapshot,
    settings::{ApplyOutcome, DisplaySettings, SettingsStore},
};

/// Snapshot of what the display is doing, published by the controller after every step.
#[derive(Clone, Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayStatus {
    pub state: DisplayState,
    pub current_cover: Option<String>,
    pub current_entity: Option<String>,
    pub is_playing: bool,
    pub clock_visible: bool,
    /// No hardware attached.
    pub preview: bool,
    pub ambient: Option<AmbientColorPair>,
    pub settings: DisplaySettings,
    pub settings_version: u64,
    pub entities: Vec<String>,
    pub ambient_devices: Vec<String>,
}

/// Cheap to clone; every clone talks to the same controller.
#[derive(Clone, Debug)]
pub struct ControlHandle {
    tx: Sender<Command>,
    status: Arc<RwLock<DisplayStatus>>,
    settings: SettingsStore,
}

impl ControlHandle {
    pub(crate) fn new(
        tx: Sender<Command>,
        status: Arc<RwLock<DisplayStatus>>,
        settings: SettingsStore,
    ) -> Self {
        Self {
            tx,
            status,
            settings,
        }
    }

    pub fn status(&self) -> DisplayStatus {
        self.status
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Validate and publish a partial settings object; the display reacts asynchronously.
    pub fn apply_settings(&self, patch: &Value) -> CoverResult<ApplyOutcome> {
        let outcome = self.settings.apply(patch)?;
        if !outcome.changed.is_empty() {
            self.send(Command::SettingsChanged(outcome.changed));
        }
        Ok(outcome)
    }

    /// Fetch and show the current cover again.
    pub fn request_refresh(&self) {
        self.send(Command::Refresh);
    }

    /// Returns `false` once the controller has stopped.
    pub fn submit_snapshot(&self, snapshot: EntitySnapshot) -> bool {
        self.tx.send(Command::Snapshot(snapshot)).is_ok()
    }

    /// Ask the controller to blank the display and stop.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    /// Route SIGINT and SIGTERM to [`ControlHandle::shutdown`] so the matrix is blanked on exit.
    /// Only one handler can be installed per process.
    pub fn shutdown_on_signal(&self) -> CoverResult<()> {
        let handle = self.clone();
        ctrlc::set_handler(move || {
            tracing::info!("termination signal received");
            handle.shutdown();
        })
        .map_err(|e| CoverError::device(format!("install signal handler: {e}")))
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    fn send(&self, cmd: Command) {
        if self.tx.send(cmd).is_err() {
            tracing::debug!("controller is gone, command dropped");
        }
    }
}
