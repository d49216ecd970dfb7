//! Trigger events consumed by the dispatcher

use std::fmt;
use std::time::Duration;

/// What caused a recovery check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Host resumed from sleep
    Wake,
    /// A matching USB device attached
    HotplugArrival,
    /// Operator asked for a check (SIGUSR1 / `--kick`)
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Wake => write!(f, "wake"),
            Trigger::HotplugArrival => write!(f, "usb-arrival"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

/// A single trigger instance, consumed once by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Cause of the event
    pub trigger: Trigger,
    /// How long to wait before probing the device
    pub settle: Duration,
}

impl Event {
    pub fn new(trigger: Trigger, settle: Duration) -> Self {
        Self { trigger, settle }
    }

    pub fn wake(settle: Duration) -> Self {
        Self::new(Trigger::Wake, settle)
    }

    pub fn hotplug(settle: Duration) -> Self {
        Self::new(Trigger::HotplugArrival, settle)
    }

    /// Manual checks never wait
    pub fn manual() -> Self {
        Self::new(Trigger::Manual, Duration::ZERO)
    }
}
