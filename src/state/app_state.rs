//! Main application state management

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Instant,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use super::{AppSettings, CountdownStatus};
use crate::{
    countdown::CoordinatorHandle,
    device::{DevicePattern, DeviceQuery, UsbDevice},
    input::{gesture_forwarder, KeyRelease, KeyReleaseHandler},
    watcher::{PresenceReader, PresenceState, PresenceWatcher},
};

/// Partial settings change submitted by the user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub device_vid: Option<String>,
    pub device_pid: Option<String>,
    pub device_name: Option<String>,
    pub countdown_seconds: Option<u32>,
    pub enabled: Option<bool>,
}

/// Outcome of a settings change that was applied in memory
#[derive(Debug, Clone)]
pub struct SettingsChange {
    pub settings: AppSettings,
    /// Set when writing the settings file failed
    pub save_error: Option<String>,
}

/// Everything the control API needs: settings, the watcher and the countdown
pub struct AppState {
    /// Handle to the countdown coordinator actor
    pub countdown: CoordinatorHandle,
    settings: Mutex<AppSettings>,
    /// Where settings are persisted; `None` keeps them in memory only
    settings_path: Option<PathBuf>,
    /// Lifecycle calls are serialized through this lock
    watcher: Mutex<PresenceWatcher>,
    /// Pattern the watcher runs with; readable while a restart holds `watcher`
    pattern: Mutex<DevicePattern>,
    presence: PresenceReader,
    devices: Arc<dyn DeviceQuery>,
    key_releases: KeyReleaseHandler,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    pub last_action: Mutex<Option<String>>,
    pub last_action_time: Mutex<Option<DateTime<Utc>>>,
}

impl AppState {
    pub fn new(
        settings: AppSettings,
        settings_path: Option<PathBuf>,
        countdown: CoordinatorHandle,
        watcher: PresenceWatcher,
        devices: Arc<dyn DeviceQuery>,
        port: u16,
        host: String,
    ) -> Self {
        let presence = watcher.reader();
        let pattern = watcher.pattern().clone();
        let key_releases = gesture_forwarder(countdown.sender());
        Self {
            countdown,
            settings: Mutex::new(settings),
            settings_path,
            watcher: Mutex::new(watcher),
            pattern: Mutex::new(pattern),
            presence,
            devices,
            key_releases,
            start_time: Instant::now(),
            port,
            host,
            last_action: Mutex::new(None),
            last_action_time: Mutex::new(None),
        }
    }

    /// Start watching for the configured device
    pub fn start_watcher(&self) -> Result<(), String> {
        let mut watcher = self.watcher.lock()
            .map_err(|e| format!("Failed to lock watcher: {}", e))?;
        watcher.start()
            .map_err(|e| format!("Failed to start presence watcher: {}", e))
    }

    /// Stop the watcher, bounded by its stop timeout
    pub fn stop_watcher(&self) -> Result<(), String> {
        let mut watcher = self.watcher.lock()
            .map_err(|e| format!("Failed to lock watcher: {}", e))?;
        watcher.stop();
        Ok(())
    }

    pub fn get_settings(&self) -> Result<AppSettings, String> {
        self.settings.lock()
            .map(|settings| settings.clone())
            .map_err(|e| format!("Failed to lock settings: {}", e))
    }

    pub fn device_state(&self) -> PresenceState {
        self.presence.state()
    }

    pub fn watched_pattern(&self) -> Result<DevicePattern, String> {
        self.pattern.lock()
            .map(|pattern| pattern.clone())
            .map_err(|e| format!("Failed to lock pattern: {}", e))
    }

    pub fn countdown_status(&self) -> CountdownStatus {
        self.countdown.status()
    }

    /// Set the enabled flag, persist it and tell the coordinator
    pub fn set_enabled(&self, enabled: bool) -> Result<SettingsChange, String> {
        info!("Setting auto-lock enabled to: {}", enabled);
        let change = self.modify_settings(|settings| settings.enabled = enabled)?;
        self.countdown.set_enabled(enabled);
        self.record_action(if enabled { "enable" } else { "disable" });
        Ok(change)
    }

    pub fn toggle_enabled(&self) -> Result<SettingsChange, String> {
        let enabled = self.get_settings()?.enabled;
        self.set_enabled(!enabled)
    }

    /// Apply a settings change. Blocks while the watcher restarts, so call it
    /// from a blocking context.
    pub fn update_settings(&self, update: SettingsUpdate) -> Result<SettingsChange, String> {
        let current = self.get_settings()?;

        let new_pattern = if update.device_vid.is_some() || update.device_pid.is_some() {
            let vid = update.device_vid.as_deref().unwrap_or(&current.device_vid);
            let pid = update.device_pid.as_deref().unwrap_or(&current.device_pid);
            match DevicePattern::parse(vid, pid) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Rejected device change: {}", e);
                    return Err(e.to_string());
                }
            }
        } else {
            None
        };

        let change = self.modify_settings(|settings| {
            if let Some(pattern) = &new_pattern {
                settings.set_pattern(pattern);
            }
            if let Some(name) = &update.device_name {
                settings.device_name = name.clone();
            }
            if let Some(seconds) = update.countdown_seconds {
                settings.set_countdown_seconds(seconds);
            }
            if let Some(enabled) = update.enabled {
                settings.enabled = enabled;
            }
        })?;

        if update.countdown_seconds.is_some() {
            self.countdown.set_countdown_seconds(change.settings.countdown_seconds);
        }
        if update.enabled.is_some() {
            self.countdown.set_enabled(change.settings.enabled);
        }
        if let Some(pattern) = new_pattern {
            self.restart_watcher(|watcher| {
                watcher.restart(Some(pattern))?;
                Ok(watcher.pattern().clone())
            })?;
        }

        self.record_action("settings");
        Ok(change)
    }

    /// Re-read the settings file and apply it. An invalid device id in the
    /// file leaves the watcher on its previous pattern. Blocks like
    /// `update_settings`.
    pub fn reload_settings(&self) -> Result<AppSettings, String> {
        let path = self.settings_path.as_ref()
            .ok_or_else(|| "Settings are not backed by a file".to_string())?;
        let loaded = AppSettings::load(path)
            .map_err(|e| format!("Failed to reload settings: {}", e))?
            .ok_or_else(|| format!("Settings file {} does not exist", path.display()))?;

        let pattern = self.restart_watcher(|watcher| {
            watcher.restart_with_ids(&loaded.device_vid, &loaded.device_pid)
        })?;

        let mut applied = loaded;
        applied.set_pattern(&pattern);
        {
            let mut settings = self.settings.lock()
                .map_err(|e| format!("Failed to lock settings: {}", e))?;
            *settings = applied.clone();
        }
        self.countdown.set_countdown_seconds(applied.countdown_seconds);
        self.countdown.set_enabled(applied.enabled);

        info!("Settings reloaded from {}", path.display());
        self.record_action("reload");
        Ok(applied)
    }

    /// List attached USB devices for picking the token
    pub fn scan_devices(&self) -> Result<Vec<UsbDevice>, String> {
        self.devices.scan_devices()
            .map_err(|e| format!("Failed to scan USB devices: {}", e))
    }

    /// Feed a key release into the cancel gesture path
    pub fn key_released(&self, release: KeyRelease) {
        (self.key_releases)(release);
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }

    fn record_action(&self, action: &str) {
        if let Ok(mut last_action) = self.last_action.lock() {
            *last_action = Some(action.to_string());
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(Utc::now());
        }
    }

    /// Run a watcher lifecycle call, then publish the pattern it ended up with
    fn restart_watcher<F>(&self, restart: F) -> Result<DevicePattern, String>
    where
        F: FnOnce(&mut PresenceWatcher) -> std::io::Result<DevicePattern>,
    {
        let pattern = {
            let mut watcher = self.watcher.lock()
                .map_err(|e| format!("Failed to lock watcher: {}", e))?;
            restart(&mut *watcher)
                .map_err(|e| format!("Failed to restart presence watcher: {}", e))?
        };
        let mut current = self.pattern.lock()
            .map_err(|e| format!("Failed to lock pattern: {}", e))?;
        *current = pattern.clone();
        Ok(pattern)
    }

    /// Mutate settings under the lock, then persist outside it
    fn modify_settings<F>(&self, updater: F) -> Result<SettingsChange, String>
    where
        F: FnOnce(&mut AppSettings),
    {
        let mut settings = self.settings.lock()
            .map_err(|e| format!("Failed to lock settings: {}", e))?;
        updater(&mut *settings);
        let new_settings = settings.clone();
        drop(settings);

        let save_error = self.settings_path.as_ref().and_then(|path| {
            new_settings.save(path).err().map(|e| {
                warn!("Failed to save settings to {}: {}", path.display(), e);
                format!("Settings applied but not saved to {}: {}", path.display(), e)
            })
        });
        Ok(SettingsChange { settings: new_settings, save_error })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("settings_path", &self.settings_path)
            .field("port", &self.port)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}
