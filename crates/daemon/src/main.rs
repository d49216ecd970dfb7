//! camlink-guard
//!
//! Keeps a USB capture device usable across sleep/wake cycles and
//! re-plugs. Each wake, hot-plug arrival or manual kick runs a health
//! check; a failing device is power-cycled through its hub port with an
//! escalating reset ladder until it answers again.

mod config;
mod kick;
mod notify;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use common::duration::parse_duration;
use common::setup_logging;
use config::WatchdogConfig;
use notify::DesktopNotifier;
use recovery::{Dispatcher, EventSources, Uhubctl};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "camlink-guard")]
#[command(
    author,
    version,
    about = "Recover a wedged USB capture device by power-cycling its hub port"
)]
#[command(long_about = "
Watches for system wake, USB arrival of the capture device and manual
kicks. Each trigger runs a health check (device listed and able to capture
one frame). A failing device is power-cycled through uhubctl, escalating
from a quick port cycle to a longer dual-hub power-off.

EXAMPLES:
    # Run with default config
    camlink-guard

    # Run with custom config
    camlink-guard --config /path/to/config.toml

    # Ask the running daemon for an immediate check
    camlink-guard --kick

    # Run with debug logging
    camlink-guard --log-level debug

CONFIGURATION:
    The daemon looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/camlink-guard/config.toml
    3. /etc/camlink-guard/config.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Signal the running daemon to check the device now, then exit
    #[arg(long)]
    kick: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Path to the uhubctl binary
    #[arg(long, value_name = "PATH")]
    uhubctl_path: Option<PathBuf>,

    /// Path to the ffmpeg binary
    #[arg(long, value_name = "PATH")]
    ffmpeg_path: Option<PathBuf>,

    /// Device name as reported by the inventory and uhubctl
    #[arg(long, value_name = "NAME")]
    device_name: Option<String>,

    /// Delay before checking after a wake (e.g. 5s, 1m)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    wake_delay: Option<Duration>,

    /// Disable desktop notifications
    #[arg(long)]
    no_notify: bool,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration
    fn apply(&self, config: &mut WatchdogConfig) {
        if let Some(level) = &self.log_level {
            config.daemon.log_level = level.clone();
        }
        if let Some(path) = &self.uhubctl_path {
            config.tools.uhubctl_path = path.clone();
        }
        if let Some(path) = &self.ffmpeg_path {
            config.tools.ffmpeg_path = path.clone();
        }
        if let Some(name) = &self.device_name {
            config.device.name = name.clone();
        }
        if let Some(delay) = self.wake_delay {
            config.triggers.wake_delay = delay;
        }
        if self.no_notify {
            config.daemon.notify = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.kick {
        let count = kick::kick_daemon().await?;
        println!("Signalled {} running daemon(s)", count);
        return Ok(());
    }

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = WatchdogConfig::default();
        let path = WatchdogConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        WatchdogConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        WatchdogConfig::load_or_default()
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    setup_logging(&config.daemon.log_level).context("Failed to setup logging")?;

    info!("camlink-guard v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", config.daemon.log_level);
    info!(
        "Watching {:?} ({}:{})",
        config.device.name, config.device.vendor_id, config.device.product_id
    );

    run(config).await
}

/// Start the event sources and dispatch until SIGINT/SIGTERM
async fn run(config: WatchdogConfig) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut handles = Vec::new();

    let (wake, handle) = if config.triggers.wake {
        watch::wake::spawn(shutdown_rx.clone())
    } else {
        info!("wake: disabled by configuration");
        (common::SignalReceiver::never(), watch::SourceHandle::idle("wake"))
    };
    handles.push(handle);

    let (hotplug, handle) = if config.triggers.hotplug {
        watch::hotplug::spawn(config.vendor_id()?, config.product_id()?, shutdown_rx.clone())
    } else {
        info!("hotplug: disabled by configuration");
        (common::SignalReceiver::never(), watch::SourceHandle::idle("hotplug"))
    };
    handles.push(handle);

    let (manual, handle) = watch::manual::spawn(shutdown_rx);
    handles.push(handle);

    let dispatcher = Dispatcher::new(
        config.health_config(),
        Uhubctl::new(config.uhubctl_path()),
        DesktopNotifier::new(config.daemon.notify),
        config.dispatcher_config(),
    );

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let shutdown = async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                Err(e) => error!("Error waiting for Ctrl+C: {}", e),
            },
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
    };

    dispatcher
        .run(
            EventSources {
                wake,
                hotplug,
                manual,
            },
            shutdown,
        )
        .await;

    if shutdown_tx.send(true).is_err() {
        warn!("All event sources already stopped");
    }
    for handle in handles {
        info!("Stopping {} source...", handle.name());
        handle.join().await;
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "camlink-guard",
            "--log-level",
            "debug",
            "--uhubctl-path",
            "/usr/local/sbin/uhubctl",
            "--device-name",
            "HD60 S+",
            "--wake-delay",
            "1m30s",
            "--no-notify",
        ]);

        let mut config = WatchdogConfig::default();
        args.apply(&mut config);

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.tools.uhubctl_path, PathBuf::from("/usr/local/sbin/uhubctl"));
        assert_eq!(config.device.name, "HD60 S+");
        assert_eq!(config.triggers.wake_delay, Duration::from_secs(90));
        assert!(!config.daemon.notify);
        assert_eq!(config.tools.ffmpeg_path, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let args = Args::parse_from(["camlink-guard"]);
        let mut config = WatchdogConfig::default();
        args.apply(&mut config);

        assert_eq!(config.daemon.log_level, "info");
        assert!(config.daemon.notify);
        assert!(!args.kick);
    }

    #[test]
    fn test_invalid_wake_delay_rejected() {
        let result = Args::try_parse_from(["camlink-guard", "--wake-delay", "later"]);
        assert!(result.is_err());
    }
}
