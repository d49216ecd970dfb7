//! Common utilities for camlink-guard
//!
//! This crate provides shared functionality between the recovery core and the
//! daemon binary: error handling, logging setup, the single-slot signal
//! channel used by event sources, bounded external-command execution, and
//! duration parsing for configuration values.

pub mod channel;
pub mod duration;
pub mod error;
pub mod exec;
pub mod logging;
pub mod test_utils;

pub use channel::{SignalReceiver, SignalSender, signal_slot};
pub use error::{Error, Result};
pub use exec::{CommandOutput, run_with_timeout};
pub use logging::setup_logging;
