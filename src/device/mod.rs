//! USB device detection
//!
//! The watcher only talks to the platform through the two traits below, so
//! the `nusb` backend can be swapped for a test double.

pub mod pattern;
pub mod usb;

#[cfg(test)]
pub(crate) mod testing;

use std::{collections::HashSet, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::DetectError;

pub use pattern::DevicePattern;
pub use usb::{UsbBus, UsbHotplug};

/// Kind of presence event reported by an event source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceEvent {
    Removed,
    Inserted,
}

/// A USB device currently attached to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDevice {
    /// Four lowercase hex digits
    pub vendor_id: String,
    pub product_id: String,
    pub name: String,
    /// Platform identifier of this particular attachment
    pub device_id: String,
}

impl UsbDevice {
    pub fn display_name(&self) -> String {
        format!(
            "{} (VID_{}&PID_{})",
            self.name,
            self.vendor_id.to_ascii_uppercase(),
            self.product_id.to_ascii_uppercase()
        )
    }
}

/// Point-in-time device inventory
pub trait DeviceQuery: Send + Sync {
    /// List attached devices, one entry per vendor/product pair
    fn scan_devices(&self) -> Result<Vec<UsbDevice>, DetectError>;

    /// Whether a device matching `pattern` is attached right now
    fn is_present(&self, pattern: &DevicePattern) -> Result<bool, DetectError> {
        Ok(self.scan_devices()?.iter().any(|device| pattern.matches(device)))
    }
}

/// Source of insertion/removal notifications for one pattern
pub trait DeviceEventSource: Send + Sync {
    /// Open a fresh stream of `kind` events for devices matching `pattern`.
    /// Called again after a stream fails, so implementations must be restartable.
    fn watch(
        &self,
        pattern: &DevicePattern,
        kind: PresenceEvent,
    ) -> Result<Box<dyn DeviceEventStream>, DetectError>;
}

/// A lazy, infinite stream of presence events
pub trait DeviceEventStream: Send {
    /// Wait at most `timeout` for the next event; `DetectError::Timeout` when none arrived
    fn next_event(&mut self, timeout: Duration) -> Result<PresenceEvent, DetectError>;
}

/// Keep the first device of each vendor/product pair
pub fn dedupe_devices(devices: Vec<UsbDevice>) -> Vec<UsbDevice> {
    let mut seen = HashSet::new();
    devices
        .into_iter()
        .filter(|device| seen.insert((device.vendor_id.clone(), device.product_id.clone())))
        .collect()
}
