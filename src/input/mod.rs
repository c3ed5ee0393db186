//! System-wide key release sources feeding the cancel gesture

#[cfg(feature = "keyboard")]
pub mod keyboard;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::{countdown::Signal, error::InputError};

#[cfg(feature = "keyboard")]
pub use keyboard::KeyboardPoller;

/// Keys the listener distinguishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    ShiftLeft,
    ShiftRight,
    Other(String),
}

impl Key {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "shift_left" | "shift_l" | "lshift" | "shift" => Key::ShiftLeft,
            "shift_right" | "shift_r" | "rshift" => Key::ShiftRight,
            other => Key::Other(other.to_string()),
        }
    }

    /// Only Shift releases count toward the cancel gesture
    pub fn is_cancel_key(&self) -> bool {
        matches!(self, Key::ShiftLeft | Key::ShiftRight)
    }
}

/// A key was released somewhere on the system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRelease {
    pub key: Key,
    pub at: Instant,
}

pub type KeyReleaseHandler = Arc<dyn Fn(KeyRelease) + Send + Sync>;

/// Delivers key releases to a handler until the returned listener is stopped
pub trait InputCancelSource {
    fn subscribe(&self, handler: KeyReleaseHandler) -> Result<InputListener, InputError>;
}

/// Handle to a running input listener; stops it when dropped
#[derive(Debug)]
pub struct InputListener {
    running: Arc<AtomicBool>,
}

impl InputListener {
    pub fn new(running: Arc<AtomicBool>) -> Self {
        Self { running }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for InputListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Turn qualifying key releases into cancel-gesture signals
pub fn gesture_forwarder(tx: UnboundedSender<Signal>) -> KeyReleaseHandler {
    Arc::new(move |release: KeyRelease| {
        if !release.key.is_cancel_key() {
            trace!("Ignoring release of {:?}", release.key);
            return;
        }
        if tx.send(Signal::CancelGesture(release.at)).is_err() {
            debug!("Cancel gesture dropped, coordinator stopped");
        }
    })
}
