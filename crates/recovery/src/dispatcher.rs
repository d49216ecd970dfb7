//! Debounced recovery dispatcher
//!
//! All triggers funnel into one [`Dispatcher`]. Each trigger is handled on
//! its own task so a slow recovery never blocks the selection loop, and a
//! process-wide [`RecoveryFlag`] guarantees at most one recovery attempt runs
//! at a time. Triggers that arrive while an attempt is running are dropped,
//! not queued.

use crate::event::Event;
use crate::health::HealthProbe;
use crate::hub::HubControl;
use crate::notify::Notifier;
use crate::reset::{ResetStage, default_ladder, run_ladder};
use crate::topology::HubReport;
use common::SignalReceiver;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info};

/// "Recovery in progress" flag with scoped acquisition
#[derive(Debug, Default)]
pub struct RecoveryFlag {
    busy: AtomicBool,
}

impl RecoveryFlag {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Take the flag if nobody holds it
    ///
    /// The flag is released when the returned guard is dropped, whichever
    /// way the holder exits.
    pub fn try_acquire(&self) -> Option<RecoveryGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RecoveryGuard { flag: self })
    }

    pub fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof of holding the [`RecoveryFlag`]
#[derive(Debug)]
pub struct RecoveryGuard<'a> {
    flag: &'a RecoveryFlag,
}

impl Drop for RecoveryGuard<'_> {
    fn drop(&mut self) {
        self.flag.busy.store(false, Ordering::Release);
    }
}

/// Settle delays per trigger type (manual triggers never wait)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerDelays {
    pub wake: Duration,
    pub hotplug: Duration,
}

impl Default for TriggerDelays {
    fn default() -> Self {
        Self {
            wake: Duration::from_secs(5),
            hotplug: Duration::from_secs(2),
        }
    }
}

/// Static settings of a dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Name the device carries in the inventory and the hub report
    pub device_label: String,
    pub ladder: Vec<ResetStage>,
    pub delays: TriggerDelays,
}

impl DispatcherConfig {
    pub fn new(device_label: impl Into<String>) -> Self {
        Self {
            device_label: device_label.into(),
            ladder: default_ladder(),
            delays: TriggerDelays::default(),
        }
    }
}

/// How a handled trigger ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Another recovery was already running
    Dropped,
    /// The device passed its first probe; nothing was reset
    Healthy,
    /// The device could not be located in the hub tree
    LocateFailed(String),
    /// A ladder stage brought the device back
    Recovered { stage: String },
    /// Every ladder stage was tried without success
    Exhausted,
}

/// The three trigger streams the dispatcher listens to
#[derive(Debug, Clone)]
pub struct EventSources {
    pub wake: SignalReceiver,
    pub hotplug: SignalReceiver,
    pub manual: SignalReceiver,
}

struct Shared<P, H, N> {
    probe: P,
    hubs: H,
    notifier: N,
    config: DispatcherConfig,
    flag: RecoveryFlag,
}

/// Serializes recovery attempts across all event sources
pub struct Dispatcher<P, H, N> {
    shared: Arc<Shared<P, H, N>>,
}

impl<P, H, N> Clone for Dispatcher<P, H, N> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P, H, N> Dispatcher<P, H, N>
where
    P: HealthProbe + 'static,
    H: HubControl + 'static,
    N: Notifier + 'static,
{
    pub fn new(probe: P, hubs: H, notifier: N, config: DispatcherConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                probe,
                hubs,
                notifier,
                config,
                flag: RecoveryFlag::new(),
            }),
        }
    }

    /// Whether a recovery attempt is running right now
    pub fn is_recovering(&self) -> bool {
        self.shared.flag.is_held()
    }

    /// Handle one trigger to completion on the current task
    pub async fn handle(&self, event: Event) -> Outcome {
        let Some(_guard) = self.shared.flag.try_acquire() else {
            info!(
                "dispatcher: reset already in progress, dropping {} event",
                event.trigger
            );
            return Outcome::Dropped;
        };

        self.shared.recover(event).await
    }

    /// Handle one trigger on a fresh task
    pub fn dispatch(&self, event: Event) -> JoinHandle<Outcome> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.handle(event).await })
    }

    /// Select over all sources until `shutdown` resolves
    ///
    /// Handlers still running at shutdown are awaited, not cancelled.
    pub async fn run<F>(&self, sources: EventSources, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let delays = self.shared.config.delays;
        let mut in_flight: JoinSet<Outcome> = JoinSet::new();
        tokio::pin!(shutdown);

        info!("dispatcher: ready, waiting for events...");

        loop {
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                Ok(()) = sources.manual.recv() => Event::manual(),
                Ok(()) = sources.wake.recv() => Event::wake(delays.wake),
                Ok(()) = sources.hotplug.recv() => Event::hotplug(delays.hotplug),
            };

            let dispatcher = self.clone();
            in_flight.spawn(async move { dispatcher.handle(event).await });

            // Reap finished handlers so the set does not grow unbounded
            while let Some(result) = in_flight.try_join_next() {
                if let Err(e) = result {
                    error!("dispatcher: handler task failed: {}", e);
                }
            }
        }

        if !in_flight.is_empty() {
            info!("dispatcher: waiting for in-flight recovery to finish");
        }
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                error!("dispatcher: handler task failed: {}", e);
            }
        }
        info!("dispatcher: stopped");
    }
}

impl<P, H, N> Shared<P, H, N>
where
    P: HealthProbe,
    H: HubControl,
    N: Notifier,
{
    async fn recover(&self, event: Event) -> Outcome {
        let label = &self.config.device_label;

        info!(
            "dispatcher: {} event, waiting {:?} before check",
            event.trigger, event.settle
        );
        tokio::time::sleep(event.settle).await;

        info!("dispatcher: checking {} health...", label);
        if self.probe.check().await {
            info!("dispatcher: {} is healthy", label);
            return Outcome::Healthy;
        }

        info!("dispatcher: {} not responding, attempting reset...", label);
        self.notifier
            .notify(&format!("{} not responding, resetting...", label));

        let located = match HubReport::enumerate(&self.hubs).await {
            Ok(report) => report.locate(label).map(|location| {
                let companion = report.companion_of(&location);
                (location, companion)
            }),
            Err(e) => Err(e),
        };
        let (location, companion) = match located {
            Ok(found) => found,
            Err(e) => {
                error!("dispatcher: {}", e);
                self.notifier
                    .notify(&format!("Could not find {} in USB hub tree", label));
                return Outcome::LocateFailed(e.to_string());
            }
        };

        info!("dispatcher: found {} at {}", label, location);

        let recovered = run_ladder(
            &self.hubs,
            &self.probe,
            &self.config.ladder,
            &location,
            companion.as_deref(),
        )
        .await;

        match recovered {
            Some(stage) => {
                self.notifier
                    .notify(&format!("{} recovered after {}", label, stage.name));
                Outcome::Recovered {
                    stage: stage.name.clone(),
                }
            }
            None => {
                self.notifier
                    .notify(&format!("{} reset failed, try unplugging it", label));
                Outcome::Exhausted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_exclusive() {
        let flag = RecoveryFlag::new();

        let guard = flag.try_acquire();
        assert!(guard.is_some());
        assert!(flag.is_held());
        assert!(flag.try_acquire().is_none());

        drop(guard);
        assert!(!flag.is_held());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn test_flag_released_on_unwind() {
        let flag = RecoveryFlag::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = flag.try_acquire().unwrap();
            panic!("handler failed");
        }));

        assert!(result.is_err());
        assert!(!flag.is_held());
    }

    #[test]
    fn test_default_delays() {
        let delays = TriggerDelays::default();
        assert_eq!(delays.wake, Duration::from_secs(5));
        assert_eq!(delays.hotplug, Duration::from_secs(2));
    }
}
