//! Countdown state machine
//!
//! `CountdownCoordinator` is plain data with no timers or threads of its own.
//! Every input arrives as a [`Signal`] and every side effect leaves as an
//! [`Effect`], which the actor in `tasks::countdown` carries out. Applying
//! signals one at a time from a single task is what serializes the watcher,
//! the input listener and the ticker against each other.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    gesture::{CancelGesture, CANCEL_WINDOW},
    notice::{CancelReason, Notice},
    session::{clamp_countdown, CountdownSession},
};
use crate::{state::CountdownStatus, watcher::PresenceTransition};

/// Lifecycle of the current countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Armed,
    Cancelling,
    Completing,
}

/// Inputs to the coordinator, in the order they were sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    DeviceRemoved,
    DeviceInserted,
    /// A qualifying key release at the given instant
    CancelGesture(Instant),
    SetEnabled(bool),
    SetCountdown(u32),
    Tick { session: u64 },
    Settled { session: u64 },
    Shutdown,
}

impl From<PresenceTransition> for Signal {
    fn from(transition: PresenceTransition) -> Self {
        match transition {
            PresenceTransition::Removed => Signal::DeviceRemoved,
            PresenceTransition::Inserted => Signal::DeviceInserted,
        }
    }
}

/// Work the actor performs after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartTicker { session: u64 },
    StopTicker,
    ScheduleSettle { session: u64 },
    Lock { session: u64 },
    Notify(Notice),
}

/// Owns the single countdown session and decides every transition
#[derive(Debug)]
pub struct CountdownCoordinator {
    countdown_seconds: u32,
    enabled: bool,
    phase: Phase,
    session: Option<CountdownSession>,
    gesture: CancelGesture,
    last_session_id: u64,
}

impl CountdownCoordinator {
    pub fn new(countdown_seconds: u32, enabled: bool) -> Self {
        Self {
            countdown_seconds: clamp_countdown(countdown_seconds),
            enabled,
            phase: Phase::Idle,
            session: None,
            gesture: CancelGesture::new(CANCEL_WINDOW),
            last_session_id: 0,
        }
    }

    pub fn with_cancel_window(mut self, window: Duration) -> Self {
        self.gesture = CancelGesture::new(window);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> Option<&CountdownSession> {
        self.session.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn countdown_seconds(&self) -> u32 {
        self.countdown_seconds
    }

    pub fn is_session_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn status(&self) -> CountdownStatus {
        CountdownStatus {
            phase: self.phase,
            enabled: self.enabled,
            countdown_seconds: self.countdown_seconds,
            session: self.session.clone(),
        }
    }

    /// Apply one signal; `Shutdown` is handled by the actor and is inert here
    pub fn handle(&mut self, signal: Signal) -> Vec<Effect> {
        match signal {
            Signal::DeviceRemoved => self.on_device_removed(),
            Signal::DeviceInserted => self.on_device_inserted(),
            Signal::CancelGesture(at) => self.on_cancel_gesture(at),
            Signal::SetEnabled(enabled) => self.set_enabled(enabled),
            Signal::SetCountdown(seconds) => {
                self.set_countdown_seconds(seconds);
                Vec::new()
            }
            Signal::Tick { session } => self.tick(session),
            Signal::Settled { session } => self.settle(session),
            Signal::Shutdown => Vec::new(),
        }
    }

    pub fn on_device_removed(&mut self) -> Vec<Effect> {
        if !self.enabled {
            info!("Device removed but auto-lock is disabled");
            return vec![Effect::Notify(Notice::DeviceRemoved { armed: false })];
        }
        if let Some(session) = &self.session {
            debug!("Device removed while countdown {} is {:?}, ignoring", session.id, self.phase);
            return Vec::new();
        }

        self.last_session_id += 1;
        let session = CountdownSession::new(self.last_session_id, self.countdown_seconds);
        info!("Arming countdown {} for {} seconds", session.id, session.total_seconds);

        let effects = vec![
            Effect::Notify(Notice::DeviceRemoved { armed: true }),
            Effect::StartTicker { session: session.id },
            Effect::Notify(Notice::Armed { session: session.id, remaining: session.remaining }),
        ];
        self.session = Some(session);
        self.phase = Phase::Armed;
        effects
    }

    pub fn on_device_inserted(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.phase == Phase::Armed {
            effects.extend(self.cancel(CancelReason::DeviceInserted));
        }
        effects.push(Effect::Notify(Notice::DevicePresent));
        effects
    }

    pub fn on_cancel_gesture(&mut self, at: Instant) -> Vec<Effect> {
        let paired = self.gesture.record(at);
        if paired && self.phase == Phase::Armed {
            self.cancel(CancelReason::Gesture)
        } else {
            Vec::new()
        }
    }

    /// Only future arming decisions look at the flag; a running countdown continues
    pub fn set_enabled(&mut self, enabled: bool) -> Vec<Effect> {
        if self.enabled == enabled {
            return Vec::new();
        }
        self.enabled = enabled;
        info!("Auto-lock {}", if enabled { "enabled" } else { "disabled" });
        vec![Effect::Notify(Notice::EnabledChanged { enabled })]
    }

    /// Takes effect from the next armed countdown
    pub fn set_countdown_seconds(&mut self, seconds: u32) {
        self.countdown_seconds = clamp_countdown(seconds);
    }

    pub fn tick(&mut self, session_id: u64) -> Vec<Effect> {
        if self.phase != Phase::Armed {
            debug!("Stale tick for countdown {} in {:?}", session_id, self.phase);
            return Vec::new();
        }
        let Some(session) = self.session.as_mut().filter(|s| s.id == session_id && !s.cancelled) else {
            debug!("Tick for unknown countdown {}", session_id);
            return Vec::new();
        };

        if !session.tick() {
            return vec![Effect::Notify(Notice::Remaining {
                session: session.id,
                remaining: session.remaining,
            })];
        }

        self.phase = Phase::Completing;
        info!("Countdown {} expired, locking session", session_id);
        let effects = vec![
            Effect::StopTicker,
            Effect::Lock { session: session_id },
            Effect::Notify(Notice::Locking { session: session_id }),
        ];
        // The lock call is fire-and-forget, so completion ends the session right away
        self.finish();
        effects
    }

    pub fn settle(&mut self, session_id: u64) -> Vec<Effect> {
        let matches = self.session.as_ref().map(|s| s.id) == Some(session_id);
        if self.phase != Phase::Cancelling || !matches {
            debug!("Ignoring settle for countdown {}", session_id);
            return Vec::new();
        }
        self.finish();
        vec![Effect::Notify(Notice::Settled { session: session_id })]
    }

    fn cancel(&mut self, reason: CancelReason) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.cancelled = true;
        self.phase = Phase::Cancelling;
        info!("Countdown {} cancelled ({:?})", session.id, reason);
        vec![
            Effect::StopTicker,
            Effect::ScheduleSettle { session: session.id },
            Effect::Notify(Notice::Cancelled { session: session.id, reason }),
        ]
    }

    fn finish(&mut self) {
        self.session = None;
        self.phase = Phase::Idle;
    }
}
