//! Error types shared across the detection, lock and settings layers

use thiserror::Error;

/// Errors reported by device queries and event sources
#[derive(Debug, Error)]
pub enum DetectError {
    /// No event arrived within the poll timeout; expected and not logged
    #[error("timed out waiting for a device event")]
    Timeout,
    #[error("device scan failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("device event source unavailable: {0}")]
    Unavailable(String),
}

impl DetectError {
    /// Whether the watcher loop should simply carry on without logging or backing off
    pub fn is_transient(&self) -> bool {
        matches!(self, DetectError::Timeout)
    }
}

/// Errors produced when parsing vendor/product identifiers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("invalid vendor id `{0}`, expected four hex digits such as VID_1050")]
    InvalidVendor(String),
    #[error("invalid product id `{0}`, expected four hex digits such as PID_0407")]
    InvalidProduct(String),
}

/// Errors from invoking the session lock command
#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to launch lock command `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("lock command exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Errors from loading or saving persisted settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from starting a system-wide input listener
#[derive(Debug, Error)]
pub enum InputError {
    #[error("keyboard listener unavailable: {0}")]
    Unavailable(String),
}
