use std::{
    path::PathBuf,
    sync::{Arc, RwLock},
    time::Duration,
};

use anyhow::Context as _;
use serde_json::{Map, Value};

use crate::{
    foundation::{
        core::{Rgb8, parse_color_value},
        error::{CoverError, CoverResult},
    },
    transitions::TransitionKind,
};

pub const MAX_TRANSITION_MS: u64 = 60_000;
pub const MAX_AMBIENT_COLORS: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplaySettings {
    /// Percent, 0-100.
    pub brightness: u8,
    pub transition: TransitionKind,
    /// Milliseconds, > 0.
    pub transition_duration: u64,
    pub show_clock: bool,
    pub clock_color: Rgb8,
    /// Colours extracted per cover for the ambient lights, >= 2.
    pub ambient_colors: usize,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            brightness: 85,
            transition: TransitionKind::Crossfade,
            transition_duration: 500,
            show_clock: true,
            clock_color: Rgb8::new(120, 80, 200),
            ambient_colors: 5,
        }
    }
}

impl DisplaySettings {
    pub fn transition_duration(&self) -> Duration {
        Duration::from_millis(self.transition_duration)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct RejectedField {
    pub field: String,
    pub reason: String,
}

/// Which groups of settings a patch actually changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub brightness: bool,
    pub transition: bool,
    pub clock: bool,
    pub ambient: bool,
}

impl ChangeSet {
    pub fn between(before: &DisplaySettings, after: &DisplaySettings) -> Self {
        Self {
            brightness: before.brightness != after.brightness,
            transition: before.transition != after.transition
                || before.transition_duration != after.transition_duration,
            clock: before.show_clock != after.show_clock
                || before.clock_color != after.clock_color,
            ambient: before.ambient_colors != after.ambient_colors,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.brightness || self.transition || self.clock || self.ambient)
    }
}

#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub settings: DisplaySettings,
    pub version: u64,
    pub rejected: Vec<RejectedField>,
    pub changed: ChangeSet,
}

fn whole_number(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

/// Validate one field and write it into `settings`.
fn apply_field(settings: &mut DisplaySettings, key: &str, value: &Value) -> Result<(), String> {
    match key {
        "brightness" => {
            let v = whole_number(value).ok_or("must be an integer")?;
            settings.brightness = u8::try_from(v)
                .ok()
                .filter(|b| *b <= 100)
                .ok_or_else(|| format!("{v} is outside 0..=100"))?;
        }
        "transition" => {
            let name = value.as_str().ok_or("must be a string")?;
            let kind: TransitionKind = name.parse().map_err(|e: CoverError| e.to_string())?;
            if !kind.is_selectable() {
                return Err(format!("'{name}' cannot be selected"));
            }
            settings.transition = kind;
        }
        "transitionDuration" => {
            let v = whole_number(value).ok_or("must be an integer")?;
            if v <= 0 || v as u64 > MAX_TRANSITION_MS {
                return Err(format!("{v} is outside 1..={MAX_TRANSITION_MS}"));
            }
            settings.transition_duration = v as u64;
        }
        "showClock" => {
            settings.show_clock = value.as_bool().ok_or("must be a boolean")?;
        }
        "clockColor" => {
            settings.clock_color = parse_color_value(value).map_err(|e| e.to_string())?;
        }
        "ambientColors" => {
            let v = whole_number(value).ok_or("must be an integer")?;
            if v < 2 || v as usize > MAX_AMBIENT_COLORS {
                return Err(format!("{v} is outside 2..={MAX_AMBIENT_COLORS}"));
            }
            settings.ambient_colors = v as usize;
        }
        _ => return Err("unknown setting".to_string()),
    }
    Ok(())
}

/// Strict: apply every valid field of `patch` on top of `base`, reporting the rest.
pub fn validate_patch(
    base: &DisplaySettings,
    patch: &Map<String, Value>,
) -> (DisplaySettings, Vec<RejectedField>) {
    let mut next = base.clone();
    let mut rejected = Vec::new();
    for (key, value) in patch {
        if let Err(reason) = apply_field(&mut next, key, value) {
            rejected.push(RejectedField {
                field: key.clone(),
                reason,
            });
        }
    }
    (next, rejected)
}

/// Lenient: persisted overrides on top of `defaults`; bad entries are skipped with a warning.
pub fn merge_persisted(defaults: &DisplaySettings, stored: &Map<String, Value>) -> DisplaySettings {
    let mut merged = defaults.clone();
    for (key, value) in stored {
        if key == "transition" {
            if let Some(name) = value.as_str() {
                merged.transition = TransitionKind::parse_lenient(name);
                continue;
            }
        }
        if let Err(reason) = apply_field(&mut merged, key, value) {
            tracing::warn!(field = %key, %reason, "ignoring persisted setting");
        }
    }
    merged
}

#[derive(Debug)]
struct Versioned {
    version: u64,
    settings: DisplaySettings,
}

/// Shared, versioned settings record. Cloning shares the same record.
#[derive(Clone, Debug)]
pub struct SettingsStore {
    inner: Arc<RwLock<Versioned>>,
    path: Option<PathBuf>,
}

impl SettingsStore {
    pub fn new(initial: DisplaySettings, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Versioned {
                version: 0,
                settings: initial,
            })),
            path,
        }
    }

    /// Defaults merged with whatever is saved at `path` (a missing file means no overrides).
    pub fn load(defaults: DisplaySettings, path: Option<PathBuf>) -> CoverResult<Self> {
        let settings = match path.as_deref() {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("read settings '{}'", p.display()))?;
                let value: Value = serde_json::from_str(&raw)?;
                let stored = value.as_object().ok_or_else(|| {
                    CoverError::settings(format!("'{}' must hold a JSON object", p.display()))
                })?;
                merge_persisted(&defaults, stored)
            }
            _ => defaults,
        };
        Ok(Self::new(settings, path))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Versioned> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    pub fn get(&self) -> DisplaySettings {
        self.read().settings.clone()
    }

    pub fn snapshot(&self) -> (u64, DisplaySettings) {
        let guard = self.read();
        (guard.version, guard.settings.clone())
    }

    pub fn version(&self) -> u64 {
        self.read().version
    }

    pub fn brightness(&self) -> u8 {
        self.read().settings.brightness
    }

    /// Validate and publish `patch` (a JSON object of camelCase fields).
    ///
    /// Invalid fields are rejected individually; the rest land together in one new version.
    pub fn apply(&self, patch: &Value) -> CoverResult<ApplyOutcome> {
        let fields = patch
            .as_object()
            .ok_or_else(|| CoverError::settings("settings patch must be a JSON object"))?;

        let outcome = {
            let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
            let (next, rejected) = validate_patch(&guard.settings, fields);
            let changed = ChangeSet::between(&guard.settings, &next);
            if !changed.is_empty() {
                guard.version += 1;
                guard.settings = next;
            }
            ApplyOutcome {
                settings: guard.settings.clone(),
                version: guard.version,
                rejected,
                changed,
            }
        };

        for r in &outcome.rejected {
            tracing::warn!(field = %r.field, reason = %r.reason, "rejected setting");
        }
        if !outcome.changed.is_empty() {
            tracing::info!(version = outcome.version, changed = ?outcome.changed, "settings updated");
            if let Err(e) = self.save() {
                tracing::warn!(error = %e, "could not persist settings");
            }
        }
        Ok(outcome)
    }

    /// Overwrite the settings file atomically (write a sibling temp file, then rename).
    pub fn save(&self) -> CoverResult<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.get())?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create settings dir '{}'", parent.display()))?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).with_context(|| format!("write '{}'", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("replace settings '{}'", path.display()))?;
        Ok(())
    }
}
