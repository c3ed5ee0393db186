//! User-visible notifications from the countdown

use serde::{Deserialize, Serialize};

/// Why an armed countdown was called off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Gesture,
    DeviceInserted,
}

/// Something the presentation layer should show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    Armed { session: u64, remaining: u32 },
    Remaining { session: u64, remaining: u32 },
    Cancelled { session: u64, reason: CancelReason },
    Settled { session: u64 },
    Locking { session: u64 },
    LockFailed { session: u64, error: String },
    DeviceRemoved { armed: bool },
    DevicePresent,
    EnabledChanged { enabled: bool },
}

impl Notice {
    /// Text shown to the user for this notice
    pub fn message(&self) -> String {
        match self {
            Notice::Armed { remaining, .. } | Notice::Remaining { remaining, .. } => {
                format!("USB key removed! Locking in {} seconds (double-press Shift to cancel)", remaining)
            }
            Notice::Cancelled { reason: CancelReason::Gesture, .. } => "Lock cancelled".to_string(),
            Notice::Cancelled { reason: CancelReason::DeviceInserted, .. } => {
                "Lock cancelled, USB key inserted again".to_string()
            }
            Notice::Settled { .. } => "Countdown closed".to_string(),
            Notice::Locking { .. } => "Locking session".to_string(),
            Notice::LockFailed { error, .. } => format!("Failed to lock session: {}", error),
            Notice::DeviceRemoved { armed: false } => "USB key removed, auto-lock is disabled".to_string(),
            Notice::DeviceRemoved { armed: true } => "USB key removed".to_string(),
            Notice::DevicePresent => "USB key inserted".to_string(),
            Notice::EnabledChanged { enabled: true } => "Auto-lock enabled".to_string(),
            Notice::EnabledChanged { enabled: false } => "Auto-lock disabled".to_string(),
        }
    }
}
