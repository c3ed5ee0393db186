//! API response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    countdown::Phase,
    device::UsbDevice,
    state::{AppSettings, SettingsChange},
    watcher::PresenceState,
};

/// API response structure for state change endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub settings: AppSettings,
    /// Present when the change applied but could not be persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ApiResponse {
    /// Create a new API response
    pub fn new(status: String, message: String, settings: AppSettings) -> Self {
        Self {
            status,
            message,
            timestamp: Utc::now(),
            settings,
            warning: None,
        }
    }

    /// Create a response reflecting the enabled flag
    pub fn for_settings(message: String, settings: AppSettings) -> Self {
        let status = if settings.enabled { "enabled" } else { "disabled" };
        Self::new(status.to_string(), message, settings)
    }

    /// Response for a settings change, carrying any save failure
    pub fn for_change(message: String, change: SettingsChange) -> Self {
        Self {
            warning: change.save_error,
            ..Self::for_settings(message, change.settings)
        }
    }
}

/// Error body returned with 4xx/5xx codes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: String) -> Self {
        Self {
            status: "error".to_string(),
            message,
        }
    }
}

/// Full status including the countdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub enabled: bool,
    pub device: String,
    pub device_name: String,
    pub device_state: PresenceState,
    pub countdown_seconds: u32,
    pub session_active: bool,
    pub phase: Phase,
    pub remaining_seconds: Option<u32>,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Attached USB devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<UsbDevice>,
}

/// Body of `POST /key-release`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyReleaseRequest {
    pub key: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
