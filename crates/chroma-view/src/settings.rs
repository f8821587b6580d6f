use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const APP_DIR: &str = "chroma-view";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsConfig {
    pub version: u32,
    #[serde(default = "default_true")]
    pub use_gpu: bool,
    #[serde(default)]
    pub debug: bool,
    /// Result-queue polling period; 50 ms is 20 Hz.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    50
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            version: 1,
            use_gpu: true,
            debug: false,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl SettingsConfig {
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join(SETTINGS_FILE))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn load() -> Self {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Missing or corrupt files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring corrupt settings {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) {
        if let Some(path) = Self::path() {
            self.save_to(&path);
        }
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Ok(json) = serde_json::to_string_pretty(self) {
            let _ = std::fs::write(path, json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = SettingsConfig::default();
        assert!(s.use_gpu);
        assert!(!s.debug);
        assert_eq!(s.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join(SETTINGS_FILE);
        let s = SettingsConfig {
            use_gpu: false,
            debug: true,
            poll_interval_ms: 10,
            ..Default::default()
        };
        s.save_to(&path);
        assert_eq!(SettingsConfig::load_from(&path), s);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{"version": 1, "debug": true}"#).unwrap();
        let s = SettingsConfig::load_from(&path);
        assert!(s.debug);
        assert!(s.use_gpu);
        assert_eq!(s.poll_interval_ms, 50);
    }

    #[test]
    fn corrupt_or_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        assert_eq!(SettingsConfig::load_from(&path), SettingsConfig::default());
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(SettingsConfig::load_from(&path), SettingsConfig::default());
    }
}
