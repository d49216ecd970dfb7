//! Event-driven recovery core for a USB capture device
//!
//! This crate detects that the watched capture device stopped responding and
//! brings it back by power-cycling its USB hub port. It contains:
//! - the health probe (inventory presence plus a one-frame capture)
//! - the topology resolver over the hub-control tool's report
//! - the escalating reset executor driven by a fixed stage ladder
//! - the debounced dispatcher that serializes recovery attempts
//!
//! Event sources (wake, hot-plug, manual) live in the daemon and feed the
//! dispatcher through [`common::SignalReceiver`]s.

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod health;
pub mod hub;
pub mod notify;
pub mod reset;
pub mod test_utils;
pub mod topology;

pub use dispatcher::{
    Dispatcher, DispatcherConfig, EventSources, Outcome, RecoveryFlag, RecoveryGuard, TriggerDelays,
};
pub use error::{RecoveryError, Result};
pub use event::{Event, Trigger};
pub use health::{HealthConfig, HealthFailure, HealthProbe};
pub use hub::{HubControl, PowerAction, Uhubctl};
pub use notify::Notifier;
pub use reset::{ResetStage, default_ladder, run_ladder};
pub use topology::{DeviceLocation, HubReport};
