//! Double key-release cancel gesture

use std::time::{Duration, Instant};

/// Two qualifying releases closer together than this cancel the countdown
pub const CANCEL_WINDOW: Duration = Duration::from_millis(500);

/// Remembers the last qualifying release
#[derive(Debug, Clone)]
pub struct CancelGesture {
    window: Duration,
    last_release: Option<Instant>,
}

impl CancelGesture {
    pub fn new(window: Duration) -> Self {
        Self { window, last_release: None }
    }

    /// Record a release at `at`; true when it pairs with the previous one
    pub fn record(&mut self, at: Instant) -> bool {
        let paired = self
            .last_release
            .map(|previous| at.saturating_duration_since(previous) < self.window)
            .unwrap_or(false);
        self.last_release = Some(at);
        paired
    }
}

impl Default for CancelGesture {
    fn default() -> Self {
        Self::new(CANCEL_WINDOW)
    }
}
