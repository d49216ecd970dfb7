//! Test doubles for the recovery collaborators
//!
//! Scripted and recording implementations of [`HealthProbe`], [`HubControl`]
//! and [`Notifier`] so the ladder and the dispatcher can be exercised
//! without hardware. All of them are cheap to clone and share their state
//! between clones, so a test can keep one handle and give another away.

use crate::health::HealthProbe;
use crate::hub::{HubControl, PowerAction};
use crate::notify::Notifier;
use crate::reset::ResetStage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Default ladder shape with millisecond timings
pub fn fast_ladder() -> Vec<ResetStage> {
    vec![
        ResetStage::new("quick cycle", Duration::from_millis(2), Duration::from_millis(3), false),
        ResetStage::new("full reset", Duration::from_millis(10), Duration::from_millis(5), true),
        ResetStage::new("extended reset", Duration::from_millis(30), Duration::from_millis(5), true),
    ]
}

/// Hub report with the Cam Link behind a VIA hub and its USB2 companion
pub const VIA_HUB_REPORT: &str = "\
Current status for hub 2-1 [2109:0813 VIA Labs, Inc. USB3.0 Hub, USB 3.10, 4 ports, ppps]
  Port 1: 02a0 power 5gbps Rx.Detect
  Port 4: 0203 power 5gbps U0 enable connect [0fd9:007b Elgato Cam Link 4K 0004A1B2C3]
Current status for hub 1-1 [2109:2813 VIA Labs, Inc. USB2.0 Hub, USB 2.10, 4 ports, ppps]
  Port 1: 0100 power
  Port 4: 0100 power
";

#[derive(Debug, Default)]
struct ProbeState {
    results: Mutex<VecDeque<bool>>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

/// Health probe that answers from a script, then reports unhealthy
#[derive(Debug, Clone, Default)]
pub struct ScriptedProbe {
    state: Arc<ProbeState>,
    delay: Duration,
}

impl ScriptedProbe {
    pub fn new(results: &[bool]) -> Self {
        let probe = Self::default();
        probe
            .state
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(results.iter().copied());
        probe
    }

    /// Make every check take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of checks performed so far
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Highest number of checks that were running at the same time
    pub fn max_concurrent(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }
}

impl HealthProbe for ScriptedProbe {
    async fn check(&self) -> bool {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self
            .state
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(false);

        self.state.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Debug, Default)]
struct HubState {
    actions: Mutex<Vec<(String, u16, PowerAction)>>,
    enumerations: AtomicUsize,
}

/// Hub control that serves a fixed report and records power actions
#[derive(Debug, Clone, Default)]
pub struct RecordingHubs {
    state: Arc<HubState>,
    report: String,
    fail_power: bool,
    fail_enumerate: bool,
}

impl RecordingHubs {
    pub fn new(report: &str) -> Self {
        Self {
            report: report.to_string(),
            ..Self::default()
        }
    }

    /// Every power action fails (but is still recorded)
    pub fn failing_power(mut self) -> Self {
        self.fail_power = true;
        self
    }

    /// Enumeration fails as if the tool could not run
    pub fn failing_enumerate(mut self) -> Self {
        self.fail_enumerate = true;
        self
    }

    pub fn actions(&self) -> Vec<(String, u16, PowerAction)> {
        self.state
            .actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn enumerations(&self) -> usize {
        self.state.enumerations.load(Ordering::SeqCst)
    }
}

impl HubControl for RecordingHubs {
    async fn enumerate(&self) -> common::Result<String> {
        self.state.enumerations.fetch_add(1, Ordering::SeqCst);
        if self.fail_enumerate {
            return Err(common::Error::Other("uhubctl not available".to_string()));
        }
        Ok(self.report.clone())
    }

    async fn power(&self, hub: &str, port: u16, action: PowerAction) -> common::Result<()> {
        self.state
            .actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((hub.to_string(), port, action));
        if self.fail_power {
            return Err(common::Error::Other(format!("{} failed", action)));
        }
        Ok(())
    }
}

/// Notifier that keeps every message
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}
