//! Background watcher turning raw device events into presence transitions

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc as std_mpsc, Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::device::{DeviceEventSource, DeviceEventStream, DevicePattern, DeviceQuery, PresenceEvent};

/// Whether the token is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Absent,
    Present,
}

impl PresenceState {
    pub fn from_present(present: bool) -> Self {
        if present {
            PresenceState::Present
        } else {
            PresenceState::Absent
        }
    }

    pub fn is_present(self) -> bool {
        self == PresenceState::Present
    }

    /// Apply a raw event; returns the transition it causes, or `None` for a duplicate
    pub fn apply(self, event: PresenceEvent) -> (PresenceState, Option<PresenceTransition>) {
        match (self, event) {
            (PresenceState::Present, PresenceEvent::Removed) => {
                (PresenceState::Absent, Some(PresenceTransition::Removed))
            }
            (PresenceState::Absent, PresenceEvent::Inserted) => {
                (PresenceState::Present, Some(PresenceTransition::Inserted))
            }
            (state, _) => (state, None),
        }
    }
}

/// A genuine, de-duplicated change in token presence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceTransition {
    Removed,
    Inserted,
}

/// Receiver of presence transitions
pub trait TransitionSink: Send + Sync + 'static {
    fn emit(&self, transition: PresenceTransition);
}

impl<T> TransitionSink for UnboundedSender<T>
where
    T: From<PresenceTransition> + Send + 'static,
{
    fn emit(&self, transition: PresenceTransition) {
        if self.send(T::from(transition)).is_err() {
            debug!("Transition {:?} dropped, receiver closed", transition);
        }
    }
}

/// Timing knobs for the watcher loop
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Bounded wait spent on each of the two streams per iteration
    pub poll_timeout: Duration,
    /// Pause after a non-transient event source error
    pub error_backoff: Duration,
    /// Upper bound on how long `stop()` blocks
    pub stop_timeout: Duration,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
            error_backoff: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

/// Read-only view of the presence flag, shareable across threads
#[derive(Debug, Clone)]
pub struct PresenceReader(Arc<AtomicBool>);

impl PresenceReader {
    pub fn state(&self) -> PresenceState {
        PresenceState::from_present(self.0.load(Ordering::SeqCst))
    }
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    done_rx: std_mpsc::Receiver<()>,
}

/// Owns the canonical "is the token present" flag and the thread feeding it.
///
/// Lifecycle calls (`start`, `stop`, `restart`) take `&mut self`, so callers
/// sharing a watcher must serialize them behind a lock.
pub struct PresenceWatcher {
    query: Arc<dyn DeviceQuery>,
    source: Arc<dyn DeviceEventSource>,
    sink: Arc<dyn TransitionSink>,
    pattern: DevicePattern,
    present: Arc<AtomicBool>,
    options: WatcherOptions,
    worker: Option<Worker>,
}

impl PresenceWatcher {
    pub fn new(
        query: Arc<dyn DeviceQuery>,
        source: Arc<dyn DeviceEventSource>,
        sink: Arc<dyn TransitionSink>,
        pattern: DevicePattern,
        options: WatcherOptions,
    ) -> Self {
        Self {
            query,
            source,
            sink,
            pattern,
            present: Arc::new(AtomicBool::new(false)),
            options,
            worker: None,
        }
    }

    pub fn pattern(&self) -> &DevicePattern {
        &self.pattern
    }

    pub fn state(&self) -> PresenceState {
        PresenceState::from_present(self.present.load(Ordering::SeqCst))
    }

    /// The reader stays valid across restarts
    pub fn reader(&self) -> PresenceReader {
        PresenceReader(Arc::clone(&self.present))
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|worker| worker.running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Establish the initial state with one query, then start the event thread
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let initial = match self.query.is_present(&self.pattern) {
            Ok(present) => present,
            Err(e) => {
                warn!("Initial presence check for {} failed, assuming absent: {}", self.pattern, e);
                false
            }
        };
        self.present.store(initial, Ordering::SeqCst);
        info!(
            "Initial state of {}: {}",
            self.pattern,
            if initial { "present" } else { "absent" }
        );

        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = std_mpsc::channel();
        let context = LoopContext {
            query: Arc::clone(&self.query),
            source: Arc::clone(&self.source),
            sink: Arc::clone(&self.sink),
            pattern: self.pattern.clone(),
            present: Arc::clone(&self.present),
            running: Arc::clone(&running),
            options: self.options.clone(),
        };

        let handle = thread::Builder::new()
            .name("presence-watcher".to_string())
            .spawn(move || {
                context.run();
                let _ = done_tx.send(());
            })?;

        self.worker = Some(Worker { running, handle, done_rx });
        Ok(())
    }

    /// Signal the thread to exit and wait for it, at most `stop_timeout`
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.running.store(false, Ordering::SeqCst);

        match worker.done_rx.recv_timeout(self.options.stop_timeout) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    warn!("Presence watcher thread panicked");
                }
                info!("Presence watcher stopped");
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    "Presence watcher did not stop within {:?}, detaching it",
                    self.options.stop_timeout
                );
            }
        }
    }

    /// Restart watching, switching to `pattern` when given
    pub fn restart(&mut self, pattern: Option<DevicePattern>) -> std::io::Result<()> {
        self.stop();
        if let Some(pattern) = pattern {
            if pattern != self.pattern {
                info!("Watched device changed from {} to {}", self.pattern, pattern);
            }
            self.pattern = pattern;
        }
        self.start()
    }

    /// Restart with raw identifiers, keeping the previous pattern if they do not parse
    pub fn restart_with_ids(&mut self, vendor: &str, product: &str) -> std::io::Result<DevicePattern> {
        let pattern = match DevicePattern::parse(vendor, product) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!("{}; still watching {}", e, self.pattern);
                None
            }
        };
        self.restart(pattern)?;
        Ok(self.pattern.clone())
    }
}

impl Drop for PresenceWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct LoopContext {
    query: Arc<dyn DeviceQuery>,
    source: Arc<dyn DeviceEventSource>,
    sink: Arc<dyn TransitionSink>,
    pattern: DevicePattern,
    present: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    options: WatcherOptions,
}

impl LoopContext {
    fn run(self) {
        info!("Watching for device {}", self.pattern);

        while self.is_running() {
            let streams = self
                .source
                .watch(&self.pattern, PresenceEvent::Removed)
                .and_then(|removed| {
                    let inserted = self.source.watch(&self.pattern, PresenceEvent::Inserted)?;
                    Ok((removed, inserted))
                });

            match streams {
                Ok((mut removed, mut inserted)) => {
                    self.reconcile();
                    self.poll_streams(removed.as_mut(), inserted.as_mut());
                }
                Err(e) => {
                    warn!("Cannot watch {}: {}", self.pattern, e);
                    self.back_off();
                }
            }
        }

        debug!("Presence watcher loop for {} exited", self.pattern);
    }

    /// Re-check presence once the streams are open. Anything that changed
    /// while no stream was listening (startup, backoff) surfaces here as a
    /// regular event and goes through the same de-duplication.
    fn reconcile(&self) {
        match self.query.is_present(&self.pattern) {
            Ok(present) => {
                let event = if present { PresenceEvent::Inserted } else { PresenceEvent::Removed };
                self.handle_event(event);
            }
            Err(e) => warn!("Presence check for {} failed: {}", self.pattern, e),
        }
    }

    /// Alternate between both streams until stopped or a stream fails hard.
    /// A failed stream is dropped so `run` reopens both after the backoff.
    fn poll_streams(&self, removed: &mut dyn DeviceEventStream, inserted: &mut dyn DeviceEventStream) {
        while self.poll_once(removed) && self.poll_once(inserted) {}
    }

    /// Wait on one stream; false when the loop should leave `poll_streams`
    fn poll_once(&self, stream: &mut dyn DeviceEventStream) -> bool {
        match stream.next_event(self.options.poll_timeout) {
            // A detached thread must not emit after `stop()` gave up on it
            Ok(event) if self.is_running() => self.handle_event(event),
            Ok(event) => debug!("Dropping {:?} event after stop", event),
            Err(e) if e.is_transient() => {}
            Err(e) => {
                warn!("Device event error: {}", e);
                self.back_off();
                return false;
            }
        }
        self.is_running()
    }

    fn handle_event(&self, event: PresenceEvent) {
        let current = PresenceState::from_present(self.present.load(Ordering::SeqCst));
        let (next, transition) = current.apply(event);
        match transition {
            Some(transition) => {
                self.present.store(next.is_present(), Ordering::SeqCst);
                info!("Device {} {:?}", self.pattern, transition);
                self.sink.emit(transition);
            }
            None => debug!("Duplicate {:?} event suppressed", event),
        }
    }

    /// Sleep for the error backoff in short slices so `stop()` stays responsive
    fn back_off(&self) {
        let deadline = Instant::now() + self.options.error_backoff;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(self.options.poll_timeout));
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Keep only the events that change state, as the watcher would emit them
pub fn dedupe_events(
    initial: PresenceState,
    events: impl IntoIterator<Item = PresenceEvent>,
) -> Vec<PresenceTransition> {
    let mut state = initial;
    let mut emitted = Vec::new();
    for event in events {
        let (next, transition) = state.apply(event);
        state = next;
        emitted.extend(transition);
    }
    emitted
}
