//! Polling keyboard listener built on `device_query`
//!
//! Polls the global key state instead of installing a hook, which keeps it
//! usable from a plain background thread on every desktop platform.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use device_query::{DeviceQuery, DeviceState, Keycode};
use tracing::{info, trace};

use super::{InputCancelSource, InputListener, Key, KeyRelease, KeyReleaseHandler};
use crate::error::InputError;

/// Key state sampling period
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct KeyboardPoller {
    poll_interval: Duration,
}

impl KeyboardPoller {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for KeyboardPoller {
    fn default() -> Self {
        Self::new(POLL_INTERVAL)
    }
}

impl InputCancelSource for KeyboardPoller {
    fn subscribe(&self, handler: KeyReleaseHandler) -> Result<InputListener, InputError> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let poll_interval = self.poll_interval;

        thread::Builder::new()
            .name("keyboard-listener".to_string())
            .spawn(move || {
                let device_state = DeviceState::new();
                let mut was_down = (false, false);

                while flag.load(Ordering::SeqCst) {
                    let keys = device_state.get_keys();
                    let down = (keys.contains(&Keycode::LShift), keys.contains(&Keycode::RShift));

                    // Falling edge is a release
                    if was_down.0 && !down.0 {
                        trace!("Left shift released");
                        handler(KeyRelease { key: Key::ShiftLeft, at: Instant::now() });
                    }
                    if was_down.1 && !down.1 {
                        trace!("Right shift released");
                        handler(KeyRelease { key: Key::ShiftRight, at: Instant::now() });
                    }

                    was_down = down;
                    thread::sleep(poll_interval);
                }
            })
            .map_err(|e| InputError::Unavailable(e.to_string()))?;

        info!("Keyboard listener started");
        Ok(InputListener::new(running))
    }
}
