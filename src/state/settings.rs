//! Persisted user settings

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    countdown::clamp_countdown,
    device::DevicePattern,
    error::{PatternError, SettingsError},
};

/// Settings stored in `config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub device_vid: String,
    pub device_pid: String,
    /// Friendly name shown next to the ids, optional
    pub device_name: String,
    pub countdown_seconds: u32,
    pub enabled: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            device_vid: "VID_1050".to_string(),
            device_pid: "PID_0407".to_string(),
            device_name: String::new(),
            countdown_seconds: 5,
            enabled: true,
        }
    }
}

impl AppSettings {
    /// Default location under the user's config directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("usb-autolocker")
            .join("config.json")
    }

    /// Load settings, falling back to defaults when the file is missing or unreadable
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                info!("No settings at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Failed to read settings from {}, using defaults: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>, SettingsError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        let mut settings: Self = serde_json::from_str(&raw)?;
        settings.countdown_seconds = clamp_countdown(settings.countdown_seconds);
        Ok(Some(settings))
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn pattern(&self) -> Result<DevicePattern, PatternError> {
        DevicePattern::parse(&self.device_vid, &self.device_pid)
    }

    /// Store a pattern in the persisted `VID_XXXX` / `PID_XXXX` form
    pub fn set_pattern(&mut self, pattern: &DevicePattern) {
        self.device_vid = pattern.vid_label();
        self.device_pid = pattern.pid_label();
    }

    pub fn set_countdown_seconds(&mut self, seconds: u32) {
        self.countdown_seconds = clamp_countdown(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = AppSettings::load_or_default(&dir.path().join("config.json"));
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.pattern().unwrap().to_string(), "VID_1050&PID_0407");
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(AppSettings::load(&path).is_err());
        assert_eq!(AppSettings::load_or_default(&path), AppSettings::default());
    }

    #[test]
    fn saves_and_reloads_with_clamping() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut settings = AppSettings::default();
        settings.set_pattern(&DevicePattern::parse("0x20a0", "4108").unwrap());
        settings.device_name = "Nitrokey".into();
        settings.enabled = false;
        settings.save(&path).unwrap();

        let loaded = AppSettings::load(&path).unwrap().unwrap();
        assert_eq!(loaded.device_vid, "VID_20A0");
        assert_eq!(loaded.device_pid, "PID_4108");
        assert!(!loaded.enabled);

        fs::write(&path, r#"{"countdown_seconds": 120}"#).unwrap();
        let loaded = AppSettings::load(&path).unwrap().unwrap();
        assert_eq!(loaded.countdown_seconds, 30);
        assert_eq!(loaded.device_vid, "VID_1050");
    }
}
