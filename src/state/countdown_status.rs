//! Published snapshot of the countdown

use serde::{Deserialize, Serialize};

use crate::countdown::{CountdownSession, Phase};

/// What the UI needs to render the countdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownStatus {
    pub phase: Phase,
    pub enabled: bool,
    pub countdown_seconds: u32,
    pub session: Option<CountdownSession>,
}

impl CountdownStatus {
    /// Check if a countdown is armed or settling
    pub fn is_session_active(&self) -> bool {
        self.session.is_some()
    }

    /// Get remaining seconds while armed
    pub fn remaining(&self) -> Option<u32> {
        match self.phase {
            Phase::Armed => self.session.as_ref().map(|session| session.remaining),
            _ => None,
        }
    }
}
