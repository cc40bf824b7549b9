use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;

use crate::{
    assets::Resample,
    foundation::{
        core::Fps,
        error::{CoverError, CoverResult},
    },
    resolve::ResolverTiming,
    settings::DisplaySettings,
};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub hass_url: Option<String>,
    pub hass_token: Option<String>,
    /// Media player entities, highest priority first.
    pub entities: Vec<String>,
    pub wled_urls: Vec<String>,
    pub image_sampling: Resample,
    /// Matrix edge length in pixels.
    pub size: u32,
    pub fps: u32,
    pub debounce_ms: u64,
    pub settle_ms: u64,
    pub poll_interval_ms: u64,
    pub fetch_timeout_ms: u64,
    pub settings_path: Option<PathBuf>,
    /// External matrix driver reading raw RGB24 frames on stdin.
    pub display_command: Option<Vec<String>>,
    pub defaults: DisplaySettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hass_url: None,
            hass_token: None,
            entities: Vec::new(),
            wled_urls: Vec::new(),
            image_sampling: Resample::Nearest,
            size: 64,
            fps: 30,
            debounce_ms: 500,
            settle_ms: 1000,
            poll_interval_ms: 1000,
            fetch_timeout_ms: 5000,
            settings_path: None,
            display_command: None,
            defaults: DisplaySettings::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> CoverResult<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: AppConfig = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CoverResult<()> {
        if self.size == 0 {
            return Err(CoverError::validation("size must be > 0"));
        }
        if self.fps == 0 {
            return Err(CoverError::validation("fps must be > 0"));
        }
        if self.entities.is_empty() {
            return Err(CoverError::validation("at least one entity is required"));
        }
        // a poll landing inside the debounce window restarts it
        if self.poll_interval_ms < self.debounce_ms {
            return Err(CoverError::validation(format!(
                "pollIntervalMs ({}) must be >= debounceMs ({})",
                self.poll_interval_ms, self.debounce_ms
            )));
        }
        if self.defaults.brightness > 100 {
            return Err(CoverError::validation("defaults.brightness must be <= 100"));
        }
        if self.defaults.transition_duration == 0 {
            return Err(CoverError::validation("defaults.transitionDuration must be > 0"));
        }
        if self.defaults.ambient_colors < 2 {
            return Err(CoverError::validation("defaults.ambientColors must be >= 2"));
        }
        Ok(())
    }

    pub fn frame_rate(&self) -> CoverResult<Fps> {
        Fps::whole(self.fps)
    }

    pub fn resolver_timing(&self) -> ResolverTiming {
        ResolverTiming {
            debounce: Duration::from_millis(self.debounce_ms),
            settle: Duration::from_millis(self.settle_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
