//! A single armed countdown

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shortest and longest countdown accepted from configuration
pub const MIN_COUNTDOWN_SECONDS: u32 = 1;
pub const MAX_COUNTDOWN_SECONDS: u32 = 30;

pub fn clamp_countdown(seconds: u32) -> u32 {
    seconds.clamp(MIN_COUNTDOWN_SECONDS, MAX_COUNTDOWN_SECONDS)
}

/// One countdown from arming to its outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownSession {
    /// Monotonic id; ticks and settle timers addressed to an older id are stale
    pub id: u64,
    pub total_seconds: u32,
    pub remaining: u32,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
}

impl CountdownSession {
    pub fn new(id: u64, total_seconds: u32) -> Self {
        let total_seconds = clamp_countdown(total_seconds);
        Self {
            id,
            total_seconds,
            remaining: total_seconds,
            cancelled: false,
            started_at: Utc::now(),
        }
    }

    /// Count down one second; returns true once the countdown has run out
    pub fn tick(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_is_clamped() {
        assert_eq!(clamp_countdown(0), 1);
        assert_eq!(clamp_countdown(12), 12);
        assert_eq!(clamp_countdown(90), 30);
        assert_eq!(CountdownSession::new(1, 0).remaining, 1);
    }

    #[test]
    fn ticks_down_to_zero() {
        let mut session = CountdownSession::new(1, 2);
        assert!(!session.tick());
        assert!(session.tick());
        assert!(session.tick());
        assert_eq!(session.remaining, 0);
    }
}
