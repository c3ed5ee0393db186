//! End to end: USB bus -> presence watcher -> countdown -> locker

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc as std_mpsc, Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::broadcast, time::sleep};

use usb_autolocker::{
    countdown::{CancelReason, CoordinatorHandle, CountdownCoordinator, Notice, Phase},
    device::{DeviceEventSource, DeviceEventStream, DevicePattern, DeviceQuery, PresenceEvent, UsbDevice},
    error::{DetectError, LockError},
    services::{CommandLocker, SessionLocker},
    tasks::{spawn_countdown, CountdownOptions},
    watcher::{PresenceState, PresenceWatcher, WatcherOptions},
};

const POLL: Duration = Duration::from_millis(20);
const TICK: Duration = Duration::from_millis(100);

#[derive(Default)]
struct CountingLocker {
    calls: AtomicUsize,
}

#[async_trait]
impl SessionLocker for CountingLocker {
    async fn lock(&self) -> Result<(), LockError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "counting".into()
    }
}

/// A bus with one YubiKey port that tests plug and unplug
#[derive(Default)]
struct KeyPort {
    plugged: AtomicBool,
    streams: Mutex<Vec<(PresenceEvent, std_mpsc::Sender<PresenceEvent>)>>,
}

impl KeyPort {
    fn plug(&self) {
        self.plugged.store(true, Ordering::SeqCst);
        self.notify(PresenceEvent::Inserted);
    }

    fn unplug(&self) {
        self.plugged.store(false, Ordering::SeqCst);
        self.notify(PresenceEvent::Removed);
    }

    fn open_streams(&self) -> usize {
        self.streams.lock().unwrap().len()
    }

    fn notify(&self, event: PresenceEvent) {
        self.streams
            .lock()
            .unwrap()
            .retain(|(kind, tx)| *kind != event || tx.send(event).is_ok());
    }
}

impl DeviceQuery for KeyPort {
    fn scan_devices(&self) -> Result<Vec<UsbDevice>, DetectError> {
        if !self.plugged.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(vec![UsbDevice {
            vendor_id: "1050".into(),
            product_id: "0407".into(),
            name: "YubiKey OTP+FIDO+CCID".into(),
            device_id: "port-4".into(),
        }])
    }
}

impl DeviceEventSource for KeyPort {
    fn watch(&self, _pattern: &DevicePattern, kind: PresenceEvent) -> Result<Box<dyn DeviceEventStream>, DetectError> {
        let (tx, rx) = std_mpsc::channel();
        self.streams.lock().unwrap().push((kind, tx));
        Ok(Box::new(PortStream(rx)))
    }
}

struct PortStream(std_mpsc::Receiver<PresenceEvent>);

impl DeviceEventStream for PortStream {
    fn next_event(&mut self, timeout: Duration) -> Result<PresenceEvent, DetectError> {
        self.0.recv_timeout(timeout).map_err(|e| match e {
            std_mpsc::RecvTimeoutError::Timeout => DetectError::Timeout,
            std_mpsc::RecvTimeoutError::Disconnected => DetectError::Unavailable("port closed".into()),
        })
    }
}

struct Rig {
    watcher: PresenceWatcher,
    handle: CoordinatorHandle,
    notices: broadcast::Receiver<Notice>,
    port: Arc<KeyPort>,
}

async fn rig(countdown_seconds: u32, enabled: bool, locker: Arc<dyn SessionLocker>) -> Rig {
    let port = Arc::new(KeyPort::default());
    port.plug();

    let options = CountdownOptions { tick: TICK, settle: Duration::from_millis(150), ..Default::default() };
    let (handle, _task) =
        spawn_countdown(CountdownCoordinator::new(countdown_seconds, enabled), locker, options);
    let notices = handle.subscribe_notices();

    let mut watcher = PresenceWatcher::new(
        port.clone(),
        port.clone(),
        Arc::new(handle.sender()),
        DevicePattern::parse("VID_1050", "PID_0407").unwrap(),
        WatcherOptions { poll_timeout: POLL, ..Default::default() },
    );
    watcher.start().unwrap();
    assert_eq!(watcher.state(), PresenceState::Present);
    wait_for(|| port.open_streams() == 2).await;

    Rig { watcher, handle, notices, port }
}

fn drain(notices: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut seen = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        seen.push(notice);
    }
    seen
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unplugging_the_key_locks_once() {
    let locker = Arc::new(CountingLocker::default());
    let mut rig = rig(2, true, locker.clone()).await;

    rig.port.unplug();
    wait_for(|| rig.handle.status().phase == Phase::Armed).await;
    assert_eq!(rig.watcher.state(), PresenceState::Absent);

    wait_for(|| locker.calls.load(Ordering::SeqCst) == 1).await;
    assert_eq!(rig.handle.status().phase, Phase::Idle);

    sleep(TICK * 4).await;
    assert_eq!(locker.calls.load(Ordering::SeqCst), 1);

    let seen = drain(&mut rig.notices);
    assert_eq!(seen.first(), Some(&Notice::DeviceRemoved { armed: true }));
    assert!(seen.iter().any(|n| matches!(n, Notice::Armed { remaining: 2, .. })));
    assert!(seen.iter().any(|n| matches!(n, Notice::Locking { .. })));
    rig.watcher.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn plugging_back_in_cancels_the_countdown() {
    let locker = Arc::new(CountingLocker::default());
    let mut rig = rig(30, true, locker.clone()).await;

    rig.port.unplug();
    wait_for(|| rig.handle.status().phase == Phase::Armed).await;

    rig.port.plug();
    wait_for(|| rig.handle.status().phase == Phase::Idle).await;
    assert_eq!(rig.watcher.state(), PresenceState::Present);
    assert_eq!(locker.calls.load(Ordering::SeqCst), 0);

    let seen = drain(&mut rig.notices);
    assert!(seen
        .iter()
        .any(|n| matches!(n, Notice::Cancelled { reason: CancelReason::DeviceInserted, .. })));
    rig.watcher.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_autolock_only_reports_removal() {
    let locker = Arc::new(CountingLocker::default());
    let mut rig = rig(1, false, locker.clone()).await;

    rig.port.unplug();
    let mut seen = Vec::new();
    wait_for(|| {
        seen.extend(drain(&mut rig.notices));
        seen.contains(&Notice::DeviceRemoved { armed: false })
    })
    .await;
    assert_eq!(rig.watcher.state(), PresenceState::Absent);
    sleep(TICK * 3).await;

    assert_eq!(rig.handle.status().phase, Phase::Idle);
    assert_eq!(locker.calls.load(Ordering::SeqCst), 0);
    seen.extend(drain(&mut rig.notices));
    assert!(!seen.iter().any(|n| matches!(n, Notice::Armed { .. })));
    rig.watcher.stop();
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_lock_command_is_reported() {
    let locker = CommandLocker::new("sh", vec!["-c".into(), "exit 3".into()]);
    let mut rig = rig(1, true, Arc::new(locker)).await;

    rig.port.unplug();
    let mut seen = Vec::new();
    wait_for(|| {
        seen.extend(drain(&mut rig.notices));
        seen.iter().any(|n| matches!(n, Notice::LockFailed { .. }))
    })
    .await;
    assert!(!rig.handle.is_session_active());

    // The next removal arms again even though the last lock failed
    rig.port.plug();
    wait_for(|| rig.watcher.state() == PresenceState::Present).await;
    rig.port.unplug();
    wait_for(|| {
        seen.extend(drain(&mut rig.notices));
        seen.iter().filter(|n| matches!(n, Notice::Armed { .. })).count() == 2
    })
    .await;
    rig.watcher.stop();
}
