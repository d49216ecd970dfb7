//! Wake detection through IOKit power notifications
//!
//! `IORegisterForSystemPower` delivers messages on a notification port
//! whose run-loop source must be serviced by a CFRunLoop, so the
//! registration lives on its own thread running that loop. Shutdown stops
//! the loop from the async side with `CFRunLoopStop`.

use crate::watch::{Shutdown, SourceHandle, stopped};
use common::{SignalReceiver, SignalSender, signal_slot};
use core_foundation_sys::runloop::{
    CFRunLoopAddSource, CFRunLoopGetCurrent, CFRunLoopRef, CFRunLoopRemoveSource, CFRunLoopRun,
    CFRunLoopSourceRef, CFRunLoopStop, kCFRunLoopDefaultMode,
};
use std::ffi::c_void;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

const SOURCE: &str = "wake";

type IONotificationPortRef = *mut c_void;
type IOConnect = u32;
type IOObject = u32;
type IOService = u32;
type IOReturn = i32;
type NaturalT = u32;

type IOServiceInterestCallback = extern "C" fn(
    refcon: *mut c_void,
    service: IOService,
    message_type: NaturalT,
    message_argument: *mut c_void,
);

const MESSAGE_CAN_SYSTEM_SLEEP: NaturalT = 0xE000_0270;
const MESSAGE_SYSTEM_WILL_SLEEP: NaturalT = 0xE000_0280;
const MESSAGE_SYSTEM_HAS_POWERED_ON: NaturalT = 0xE000_0300;

#[link(name = "IOKit", kind = "framework")]
unsafe extern "C" {
    fn IORegisterForSystemPower(
        refcon: *mut c_void,
        the_port_ref: *mut IONotificationPortRef,
        callback: IOServiceInterestCallback,
        notifier: *mut IOObject,
    ) -> IOConnect;
    fn IODeregisterForSystemPower(notifier: *mut IOObject) -> IOReturn;
    fn IOAllowPowerChange(kernel_port: IOConnect, notification_id: isize) -> IOReturn;
    fn IONotificationPortGetRunLoopSource(notify: IONotificationPortRef) -> CFRunLoopSourceRef;
    fn IONotificationPortDestroy(notify: IONotificationPortRef);
    fn IOServiceClose(connect: IOConnect) -> IOReturn;
}

/// State reachable from the power callback through its refcon
struct PowerContext {
    /// Root power domain connection, set once registration returns
    root_port: AtomicU32,
    events: SignalSender,
}

extern "C" fn power_callback(
    refcon: *mut c_void,
    _service: IOService,
    message_type: NaturalT,
    message_argument: *mut c_void,
) {
    if refcon.is_null() {
        return;
    }
    // SAFETY: refcon is the PowerContext boxed in `run_power_loop`, which
    // outlives the registration.
    let context = unsafe { &*(refcon as *const PowerContext) };

    match message_type {
        // Sleep requests must be acknowledged or the system waits for a timeout
        MESSAGE_CAN_SYSTEM_SLEEP | MESSAGE_SYSTEM_WILL_SLEEP => {
            debug!("wake: acknowledging sleep request {:#x}", message_type);
            unsafe {
                IOAllowPowerChange(
                    context.root_port.load(Ordering::Acquire),
                    message_argument as isize,
                );
            }
        }
        MESSAGE_SYSTEM_HAS_POWERED_ON => {
            info!("wake: system resumed from sleep");
            if !context.events.raise() {
                debug!("wake: resume absorbed by pending signal");
            }
        }
        _ => {}
    }
}

/// Run loop of the power thread, handed to the async side for stopping
struct RunLoop(CFRunLoopRef);

// SAFETY: CFRunLoopStop may be called from any thread.
unsafe impl Send for RunLoop {}

fn run_power_loop(events: SignalSender, run_loop_tx: oneshot::Sender<RunLoop>) {
    let context = Box::into_raw(Box::new(PowerContext {
        root_port: AtomicU32::new(0),
        events,
    }));

    let mut port: IONotificationPortRef = std::ptr::null_mut();
    let mut notifier: IOObject = 0;

    // SAFETY: all pointers are valid for the duration of the call; the
    // context stays alive until after deregistration below.
    let root_port = unsafe {
        IORegisterForSystemPower(context.cast(), &mut port, power_callback, &mut notifier)
    };
    if root_port == 0 {
        error!("wake: IORegisterForSystemPower failed, wake events will not be detected");
        drop(unsafe { Box::from_raw(context) });
        return;
    }
    unsafe { (*context).root_port.store(root_port, Ordering::Release) };

    unsafe {
        let run_loop = CFRunLoopGetCurrent();
        let source = IONotificationPortGetRunLoopSource(port);
        CFRunLoopAddSource(run_loop, source, kCFRunLoopDefaultMode);

        if run_loop_tx.send(RunLoop(run_loop)).is_err() {
            debug!("wake: shutdown before run loop started");
        } else {
            info!("wake: listening for system power notifications");
            CFRunLoopRun();
        }

        CFRunLoopRemoveSource(run_loop, source, kCFRunLoopDefaultMode);
        IODeregisterForSystemPower(&mut notifier);
        IOServiceClose(root_port);
        IONotificationPortDestroy(port);
        drop(Box::from_raw(context));
    }

    info!("wake: power notifications deregistered");
}

/// Start listening for system wake
pub fn spawn(mut shutdown: Shutdown) -> (SignalReceiver, SourceHandle) {
    let (events, receiver) = signal_slot();
    let (run_loop_tx, run_loop_rx) = oneshot::channel();

    let thread = match std::thread::Builder::new()
        .name("wake".to_string())
        .spawn(move || run_power_loop(events, run_loop_tx))
    {
        Ok(thread) => thread,
        Err(e) => {
            error!("wake: failed to spawn power thread: {}", e);
            return (SignalReceiver::never(), SourceHandle::idle(SOURCE));
        }
    };

    let relay = tokio::spawn(async move {
        // Registration failed if the sender was dropped; nothing to stop
        let Ok(run_loop) = run_loop_rx.await else {
            return;
        };
        stopped(&mut shutdown).await;
        // SAFETY: the power thread keeps its run loop alive until this
        // stop makes CFRunLoopRun return.
        unsafe { CFRunLoopStop(run_loop.0) };
    });

    let handle = SourceHandle::idle(SOURCE)
        .with_task(relay)
        .with_thread(thread);
    (receiver, handle)
}
