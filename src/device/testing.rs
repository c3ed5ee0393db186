//! In-memory bus for tests: a device list plus live event streams

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc as std_mpsc, Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use super::{dedupe_devices, DeviceEventSource, DeviceEventStream, DevicePattern, DeviceQuery, PresenceEvent, UsbDevice};
use crate::error::DetectError;

struct Subscriber {
    pattern: DevicePattern,
    kind: PresenceEvent,
    tx: std_mpsc::Sender<PresenceEvent>,
}

#[derive(Default)]
pub(crate) struct FakeBus {
    devices: Mutex<Vec<UsbDevice>>,
    subscribers: Mutex<Vec<Subscriber>>,
    failing_watches: AtomicUsize,
    failing_queries: AtomicBool,
    delivered: Arc<AtomicUsize>,
}

impl FakeBus {
    pub(crate) fn with_device(vendor: &str, product: &str, name: &str) -> Arc<Self> {
        let bus = Arc::new(Self::default());
        bus.attach(vendor, product, name);
        bus
    }

    /// Plug a device in and tell matching insertion streams
    pub(crate) fn attach(&self, vendor: &str, product: &str, name: &str) {
        let device = UsbDevice {
            vendor_id: vendor.to_ascii_lowercase(),
            product_id: product.to_ascii_lowercase(),
            name: name.to_string(),
            device_id: format!("fake-{}", name),
        };
        self.notify(&device, PresenceEvent::Inserted);
        self.devices.lock().unwrap().push(device);
    }

    /// Unplug the first device with these ids and tell matching removal streams
    pub(crate) fn detach(&self, vendor: &str, product: &str) {
        let removed = {
            let mut devices = self.devices.lock().unwrap();
            let index = devices
                .iter()
                .position(|d| d.vendor_id == vendor.to_ascii_lowercase() && d.product_id == product.to_ascii_lowercase())
                .expect("device not attached");
            devices.remove(index)
        };
        self.notify(&removed, PresenceEvent::Removed);
    }

    /// Deliver a raw event to every open stream of that kind, without touching the device list
    pub(crate) fn push(&self, event: PresenceEvent) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|s| s.kind != event || s.tx.send(event).is_ok());
    }

    /// Close every open stream, as if the OS watch broke
    pub(crate) fn break_streams(&self) {
        self.subscribers.lock().unwrap().clear();
    }

    pub(crate) fn fail_next_watches(&self, count: usize) {
        self.failing_watches.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_queries(&self, failing: bool) {
        self.failing_queries.store(failing, Ordering::SeqCst);
    }

    /// Events handed out to readers so far
    pub(crate) fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    pub(crate) fn open_streams(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    pub(crate) fn wait_for_streams(&self, count: usize) {
        wait_until(|| self.open_streams() >= count);
    }

    pub(crate) fn wait_for_delivered(&self, count: usize) {
        wait_until(|| self.delivered() >= count);
    }

    fn notify(&self, device: &UsbDevice, kind: PresenceEvent) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|s| s.kind != kind || !s.pattern.matches(device) || s.tx.send(kind).is_ok());
    }
}

pub(crate) fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached within 5s");
        thread::sleep(Duration::from_millis(2));
    }
}

impl DeviceQuery for FakeBus {
    fn scan_devices(&self) -> Result<Vec<UsbDevice>, DetectError> {
        if self.failing_queries.load(Ordering::SeqCst) {
            return Err(DetectError::Unavailable("query failed".into()));
        }
        Ok(dedupe_devices(self.devices.lock().unwrap().clone()))
    }
}

impl DeviceEventSource for FakeBus {
    fn watch(&self, pattern: &DevicePattern, kind: PresenceEvent) -> Result<Box<dyn DeviceEventStream>, DetectError> {
        let failing = self
            .failing_watches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DetectError::Unavailable("not ready".into()));
        }
        let (tx, rx) = std_mpsc::channel();
        self.subscribers.lock().unwrap().push(Subscriber { pattern: pattern.clone(), kind, tx });
        Ok(Box::new(FakeStream { rx, delivered: Arc::clone(&self.delivered) }))
    }
}

struct FakeStream {
    rx: std_mpsc::Receiver<PresenceEvent>,
    delivered: Arc<AtomicUsize>,
}

impl DeviceEventStream for FakeStream {
    fn next_event(&mut self, timeout: Duration) -> Result<PresenceEvent, DetectError> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.delivered.fetch_add(1, Ordering::SeqCst);
                Ok(event)
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => Err(DetectError::Timeout),
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(DetectError::Unavailable("stream closed".into())),
        }
    }
}
