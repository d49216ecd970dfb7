//! Escalating reset executor
//!
//! Walks a fixed ladder of power-cycle stages, each more disruptive than the
//! last, re-checking health after every stage. The ladder is plain data, so
//! re-tuning it never touches the control flow below.

use crate::health::HealthProbe;
use crate::hub::{HubControl, PowerAction};
use crate::topology::DeviceLocation;
use std::time::Duration;
use tracing::{info, warn};

/// One rung of the escalation ladder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetStage {
    pub name: String,
    /// How long port power stays off
    pub off_time: Duration,
    /// Wait after power returns before probing
    pub settle: Duration,
    /// Power-cycle the companion hub together with the primary one
    pub both_hubs: bool,
}

impl ResetStage {
    pub fn new(name: impl Into<String>, off_time: Duration, settle: Duration, both_hubs: bool) -> Self {
        Self {
            name: name.into(),
            off_time,
            settle,
            both_hubs,
        }
    }
}

/// Quick single-hub cycle, then full and extended dual-hub resets
pub fn default_ladder() -> Vec<ResetStage> {
    vec![
        ResetStage::new("quick cycle", Duration::from_secs(2), Duration::from_secs(3), false),
        ResetStage::new("full reset", Duration::from_secs(10), Duration::from_secs(5), true),
        ResetStage::new("extended reset", Duration::from_secs(30), Duration::from_secs(5), true),
    ]
}

/// Run the ladder until the probe passes or every stage has been tried
///
/// Returns the stage that brought the device back. Hub-control failures are
/// logged and never abort the ladder.
pub async fn run_ladder<'a, H, P>(
    hubs: &H,
    probe: &P,
    ladder: &'a [ResetStage],
    location: &DeviceLocation,
    companion: Option<&str>,
) -> Option<&'a ResetStage>
where
    H: HubControl,
    P: HealthProbe,
{
    for stage in ladder {
        info!("reset: trying {} ({:?} off)...", stage.name, stage.off_time);

        match companion {
            Some(companion) if stage.both_hubs => {
                power(hubs, &location.hub, location.port, PowerAction::Off).await;
                power(hubs, companion, location.port, PowerAction::Off).await;
                tokio::time::sleep(stage.off_time).await;
                power(hubs, &location.hub, location.port, PowerAction::On).await;
                power(hubs, companion, location.port, PowerAction::On).await;
            }
            _ => {
                if stage.both_hubs {
                    warn!(
                        "reset: no companion hub for {}, {} degrades to a single-hub cycle",
                        location, stage.name
                    );
                }
                let action = PowerAction::Cycle {
                    off: stage.off_time,
                };
                power(hubs, &location.hub, location.port, action).await;
            }
        }

        tokio::time::sleep(stage.settle).await;

        if probe.check().await {
            info!("reset: device recovered after {}", stage.name);
            return Some(stage);
        }
    }

    warn!("reset: device still not working after all reset stages");
    None
}

async fn power<H: HubControl>(hubs: &H, hub: &str, port: u16, action: PowerAction) {
    if let Err(e) = hubs.power(hub, port, action).await {
        warn!("reset: {} hub {} port {}: {}", action, hub, port, e);
    }
}
