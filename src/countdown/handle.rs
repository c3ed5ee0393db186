//! Cheap, cloneable front door to the running coordinator

use std::time::Instant;

use tokio::sync::{broadcast, mpsc::UnboundedSender, watch};
use tracing::warn;

use super::{coordinator::Signal, notice::Notice};
use crate::state::CountdownStatus;

/// Sends signals to the coordinator actor and reads its published status
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: UnboundedSender<Signal>,
    status: watch::Receiver<CountdownStatus>,
    notices: broadcast::Sender<Notice>,
}

impl CoordinatorHandle {
    pub fn new(
        tx: UnboundedSender<Signal>,
        status: watch::Receiver<CountdownStatus>,
        notices: broadcast::Sender<Notice>,
    ) -> Self {
        Self { tx, status, notices }
    }

    pub fn on_device_removed(&self) {
        self.send(Signal::DeviceRemoved);
    }

    pub fn on_device_inserted(&self) {
        self.send(Signal::DeviceInserted);
    }

    pub fn on_cancel_gesture(&self, at: Instant) {
        self.send(Signal::CancelGesture(at));
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.send(Signal::SetEnabled(enabled));
    }

    pub fn set_countdown_seconds(&self, seconds: u32) {
        self.send(Signal::SetCountdown(seconds));
    }

    pub fn shutdown(&self) {
        self.send(Signal::Shutdown);
    }

    /// Whether a countdown is armed or settling, as of the last applied signal
    pub fn is_session_active(&self) -> bool {
        self.status.borrow().is_session_active()
    }

    pub fn status(&self) -> CountdownStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<CountdownStatus> {
        self.status.clone()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Raw sender for producers that push signals themselves (watcher, input listeners)
    pub fn sender(&self) -> UnboundedSender<Signal> {
        self.tx.clone()
    }

    fn send(&self, signal: Signal) {
        if let Err(e) = self.tx.send(signal) {
            warn!("Countdown coordinator is not running, dropped {:?}", e.0);
        }
    }
}
