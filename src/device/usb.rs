//! USB inventory and hotplug events backed by `nusb`

use std::{
    collections::HashSet,
    hash::Hash,
    sync::mpsc as std_mpsc,
    thread,
    time::Duration,
};

use futures::{
    channel::oneshot,
    executor::block_on,
    future::{select, Either},
    StreamExt,
};
use nusb::{
    hotplug::{HotplugEvent, HotplugWatch},
    DeviceId, DeviceInfo,
};
use tracing::{debug, warn};

use super::{dedupe_devices, DeviceEventSource, DeviceEventStream, DevicePattern, DeviceQuery, PresenceEvent, UsbDevice};
use crate::error::DetectError;

/// Lists attached devices through the OS USB stack
#[derive(Debug, Clone, Copy, Default)]
pub struct UsbBus;

impl DeviceQuery for UsbBus {
    fn scan_devices(&self) -> Result<Vec<UsbDevice>, DetectError> {
        let devices = nusb::list_devices()?.map(|info| usb_device(&info)).collect();
        Ok(dedupe_devices(devices))
    }
}

fn usb_device(info: &DeviceInfo) -> UsbDevice {
    let name = match (info.manufacturer_string(), info.product_string()) {
        (Some(maker), Some(product)) => format!("{} {}", maker, product),
        (None, Some(product)) => product.to_string(),
        (Some(maker), None) => maker.to_string(),
        (None, None) => "Unknown device".to_string(),
    };
    UsbDevice {
        vendor_id: hex_id(info.vendor_id()),
        product_id: hex_id(info.product_id()),
        name,
        device_id: format!("{:?}", info.id()),
    }
}

fn hex_id(id: u16) -> String {
    format!("{:04x}", id)
}

/// Event source fed by `nusb::watch_devices`
#[derive(Debug, Clone, Copy, Default)]
pub struct UsbHotplug;

impl DeviceEventSource for UsbHotplug {
    fn watch(
        &self,
        pattern: &DevicePattern,
        kind: PresenceEvent,
    ) -> Result<Box<dyn DeviceEventStream>, DetectError> {
        // Subscribe before listing so a device cannot slip between the two
        let hotplug = nusb::watch_devices()?;
        let attached = nusb::list_devices()?
            .map(|info| (info.id(), info.vendor_id(), info.product_id()));
        let filter = HotplugFilter::new(pattern.clone(), kind, attached);

        let (tx, rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        thread::Builder::new()
            .name(format!("usb-hotplug-{:?}", kind).to_lowercase())
            .spawn(move || block_on(forward_events(hotplug, filter, tx, stop_rx)))?;

        debug!("Watching USB hotplug for {:?} events of {}", kind, pattern);
        Ok(Box::new(HotplugStream { events: rx, _stop: stop_tx }))
    }
}

/// Pump hotplug events through the filter until the stream side is dropped
async fn forward_events(
    hotplug: HotplugWatch,
    mut filter: HotplugFilter<DeviceId>,
    tx: std_mpsc::Sender<PresenceEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut hotplug = Box::pin(hotplug);
    loop {
        match select(hotplug.next(), &mut stop).await {
            Either::Left((Some(event), _)) => {
                let reported = match event {
                    HotplugEvent::Connected(info) => {
                        filter.connected(info.id(), info.vendor_id(), info.product_id())
                    }
                    HotplugEvent::Disconnected(id) => filter.disconnected(&id),
                };
                if let Some(event) = reported {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            }
            Either::Left((None, _)) => {
                warn!("USB hotplug stream ended");
                break;
            }
            Either::Right(_) => break,
        }
    }
    debug!("USB hotplug forwarder for {:?} stopped", filter.kind);
}

struct HotplugStream {
    events: std_mpsc::Receiver<PresenceEvent>,
    /// Dropping this wakes the forwarder thread so it exits
    _stop: oneshot::Sender<()>,
}

impl DeviceEventStream for HotplugStream {
    fn next_event(&mut self, timeout: Duration) -> Result<PresenceEvent, DetectError> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(event),
            Err(std_mpsc::RecvTimeoutError::Timeout) => Err(DetectError::Timeout),
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                Err(DetectError::Unavailable("USB hotplug watch ended".to_string()))
            }
        }
    }
}

/// Turns raw connect/disconnect notifications into events of one kind.
///
/// A disconnect only carries the device id, so matching devices are
/// remembered from the initial listing and from every connect.
pub(crate) struct HotplugFilter<K> {
    pattern: DevicePattern,
    kind: PresenceEvent,
    known: HashSet<K>,
}

impl<K: Eq + Hash> HotplugFilter<K> {
    pub(crate) fn new(
        pattern: DevicePattern,
        kind: PresenceEvent,
        attached: impl IntoIterator<Item = (K, u16, u16)>,
    ) -> Self {
        let known = attached
            .into_iter()
            .filter(|(_, vendor, product)| pattern.matches_ids(&hex_id(*vendor), &hex_id(*product)))
            .map(|(id, _, _)| id)
            .collect();
        Self { pattern, kind, known }
    }

    pub(crate) fn connected(&mut self, id: K, vendor: u16, product: u16) -> Option<PresenceEvent> {
        if !self.pattern.matches_ids(&hex_id(vendor), &hex_id(product)) {
            return None;
        }
        self.known.insert(id);
        (self.kind == PresenceEvent::Inserted).then_some(PresenceEvent::Inserted)
    }

    pub(crate) fn disconnected(&mut self, id: &K) -> Option<PresenceEvent> {
        if !self.known.remove(id) {
            return None;
        }
        (self.kind == PresenceEvent::Removed).then_some(PresenceEvent::Removed)
    }
}
