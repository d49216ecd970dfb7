//! USB hot-plug event source
//!
//! Registers one libusb hot-plug callback filtered on the watched device's
//! vendor and product IDs and runs the libusb event loop on a dedicated
//! thread. Registration uses the enumerate pass to report devices that are
//! already attached; those are logged but never signalled, so startup with
//! the device plugged in does not trigger a recovery.

use super::{Shutdown, SourceHandle, stopped};
use async_channel::TryRecvError;
use common::{SignalReceiver, SignalSender, signal_slot};
use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SOURCE: &str = "hotplug";

/// Callback invoked by libusb for matching arrivals and departures
struct ArrivalCallback {
    events: SignalSender,
    /// Cleared while the enumerate pass reports already-present devices
    armed: Arc<AtomicBool>,
}

impl ArrivalCallback {
    fn new(events: SignalSender, armed: Arc<AtomicBool>) -> Self {
        Self { events, armed }
    }

    /// Returns true if the arrival raised a new signal
    fn on_arrival(&self, bus: u8, address: u8) -> bool {
        if !self.armed.load(Ordering::Acquire) {
            info!(
                "hotplug: device already present at startup (bus={}, addr={})",
                bus, address
            );
            return false;
        }

        let raised = self.events.raise();
        if raised {
            info!("hotplug: device arrived (bus={}, addr={})", bus, address);
        } else {
            debug!(
                "hotplug: arrival absorbed by pending signal (bus={}, addr={})",
                bus, address
            );
        }
        raised
    }
}

impl Hotplug<Context> for ArrivalCallback {
    fn device_arrived(&mut self, device: Device<Context>) {
        self.on_arrival(device.bus_number(), device.address());
    }

    fn device_left(&mut self, device: Device<Context>) {
        debug!(
            "hotplug: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
    }
}

/// State moved onto the event thread
struct HotplugWorker {
    context: Context,
    vendor_id: u16,
    product_id: u16,
    events: SignalSender,
    stop: async_channel::Receiver<()>,
}

impl HotplugWorker {
    fn run(self) {
        let armed = Arc::new(AtomicBool::new(false));
        let callback = ArrivalCallback::new(self.events.clone(), armed.clone());

        let registration: Registration<Context> = match HotplugBuilder::new()
            .vendor_id(self.vendor_id)
            .product_id(self.product_id)
            .enumerate(true)
            .register(&self.context, Box::new(callback))
        {
            Ok(registration) => registration,
            Err(e) => {
                error!(
                    "hotplug: failed to register callback for {:04x}:{:04x}: {}",
                    self.vendor_id, self.product_id, e
                );
                return;
            }
        };
        armed.store(true, Ordering::Release);

        info!(
            "hotplug: watching for {:04x}:{:04x}",
            self.vendor_id, self.product_id
        );

        loop {
            match self.stop.try_recv() {
                Ok(()) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Empty) => {}
            }

            // Blocks until an event arrives or the loop is interrupted
            match self.context.handle_events(None) {
                Ok(()) => {}
                Err(rusb::Error::Interrupted) => {
                    debug!("hotplug: event handling interrupted");
                }
                Err(e) => {
                    warn!("hotplug: error handling USB events: {}", e);
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }

        drop(registration);
        info!("hotplug: callback deregistered");
    }
}

/// Start watching for arrivals of `vendor_id:product_id`
///
/// On hosts whose libusb lacks hot-plug support, or when the USB context
/// cannot be created, the returned receiver never fires.
pub fn spawn(
    vendor_id: u16,
    product_id: u16,
    mut shutdown: Shutdown,
) -> (SignalReceiver, SourceHandle) {
    if !rusb::has_hotplug() {
        error!(
            "hotplug: libusb has no hot-plug support on this host, arrivals will not be detected"
        );
        return (SignalReceiver::never(), SourceHandle::idle(SOURCE));
    }

    let context = match Context::new() {
        Ok(context) => context,
        Err(e) => {
            error!("hotplug: failed to create USB context: {}", e);
            return (SignalReceiver::never(), SourceHandle::idle(SOURCE));
        }
    };

    let (events, receiver) = signal_slot();
    let (stop_tx, stop_rx) = async_channel::bounded(1);

    let worker = HotplugWorker {
        context: context.clone(),
        vendor_id,
        product_id,
        events,
        stop: stop_rx,
    };

    let thread = match std::thread::Builder::new()
        .name("hotplug".to_string())
        .spawn(move || worker.run())
    {
        Ok(thread) => thread,
        Err(e) => {
            error!("hotplug: failed to spawn event thread: {}", e);
            return (SignalReceiver::never(), SourceHandle::idle(SOURCE));
        }
    };

    // The event thread only notices the stop request once handle_events
    // returns, so the request is followed by an interrupt.
    let relay = tokio::spawn(async move {
        stopped(&mut shutdown).await;
        let _ = stop_tx.try_send(());
        context.interrupt_handle_events();
    });

    let handle = SourceHandle::idle(SOURCE)
        .with_task(relay)
        .with_thread(thread);
    (receiver, handle)
}
