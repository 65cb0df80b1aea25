use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Coordinator tuning, persisted to `<config dir>/leafview/coordinator.json`.
///
/// `#[serde(default)]` fills fields missing from an older file with their
/// defaults, so new knobs can be added without breaking existing configs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    // ── Window handle acquisition ────────────────────────────────────────
    pub handle_poll_attempts: u32,
    pub handle_poll_interval_ms: u64,
    pub new_window_settle_ms: u64,

    // ── Focus ────────────────────────────────────────────────────────────
    pub focus_debounce_ms: u64,

    // ── Opening ──────────────────────────────────────────────────────────
    pub password_attempts: u32,

    // ── Session restore ──────────────────────────────────────────────────
    pub reveal_cancelled_windows: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        CoordinatorSettings {
            handle_poll_attempts: 50,
            handle_poll_interval_ms: 20,
            new_window_settle_ms: 500,

            focus_debounce_ms: 500,

            password_attempts: 3,

            reveal_cancelled_windows: true,
        }
    }
}

impl CoordinatorSettings {
    pub fn handle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.handle_poll_interval_ms)
    }

    pub fn new_window_settle(&self) -> Duration {
        Duration::from_millis(self.new_window_settle_ms)
    }

    pub fn focus_debounce(&self) -> Duration {
        Duration::from_millis(self.focus_debounce_ms)
    }
}

pub fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("leafview").join("coordinator.json"))
}

pub fn load() -> CoordinatorSettings {
    match settings_path() {
        Some(path) => load_from(&path),
        None => CoordinatorSettings::default(),
    }
}

pub fn save(settings: &CoordinatorSettings) -> Result<(), String> {
    let path = settings_path().ok_or_else(|| "Unable to determine config directory".to_string())?;
    save_to(&path, settings)
}

/// Read settings from `path`, falling back to defaults when the file is
/// missing or malformed.
pub fn load_from(path: &Path) -> CoordinatorSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            log::warn!("Ignoring malformed settings at {}: {}", path.display(), e);
            CoordinatorSettings::default()
        }),
        Err(_) => CoordinatorSettings::default(),
    }
}

pub fn save_to(path: &Path, settings: &CoordinatorSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    std::fs::write(path, json).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_from(&dir.path().join("nope.json"));
        assert_eq!(settings, CoordinatorSettings::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.json");
        std::fs::write(&path, r#"{ "focus_debounce_ms": 250 }"#).unwrap();

        let settings = load_from(&path);
        assert_eq!(settings.focus_debounce(), Duration::from_millis(250));
        assert_eq!(settings.handle_poll_attempts, 50);
        assert!(settings.reveal_cancelled_windows);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_from(&path), CoordinatorSettings::default());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("coordinator.json");
        let settings = CoordinatorSettings {
            password_attempts: 1,
            reveal_cancelled_windows: false,
            ..CoordinatorSettings::default()
        };

        save_to(&path, &settings).unwrap();
        assert_eq!(load_from(&path), settings);
    }
}
