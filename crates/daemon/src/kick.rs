//! `--kick`: ask a running daemon for an immediate health check

use anyhow::{Context, Result, bail};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::time::Duration;
use tracing::{debug, warn};

/// Process name matched by `pgrep -x`
pub const PROCESS_NAME: &str = "camlink-guard";

const PGREP_TIMEOUT: Duration = Duration::from_secs(5);

/// Send `SIGUSR1` to every other running daemon
///
/// Returns the number of processes signalled. A pid that cannot be
/// signalled is skipped; the kick fails only if none could be reached.
pub async fn kick_daemon() -> Result<usize> {
    let output = common::run_with_timeout("pgrep", ["-x", PROCESS_NAME], PGREP_TIMEOUT)
        .await
        .context("Failed to run pgrep")?;

    let own_pid = std::process::id() as i32;
    let pids = parse_pids(&output.combined, own_pid);
    if pids.is_empty() {
        bail!("No running {} daemon found", PROCESS_NAME);
    }

    let signalled = signal_all(&pids, |pid| kill(Pid::from_raw(pid), Signal::SIGUSR1));
    if signalled == 0 {
        bail!("Failed to signal any of {} running daemon(s)", pids.len());
    }
    Ok(signalled)
}

/// Apply `send` to each pid, logging failures, and count the successes
fn signal_all<F, E>(pids: &[i32], mut send: F) -> usize
where
    F: FnMut(i32) -> std::result::Result<(), E>,
    E: std::fmt::Display,
{
    let mut signalled = 0;
    for &pid in pids {
        debug!("kick: signalling pid {}", pid);
        match send(pid) {
            Ok(()) => signalled += 1,
            Err(e) => warn!("kick: failed to signal pid {}: {}", pid, e),
        }
    }
    signalled
}

/// Parse `pgrep` output into pids, skipping `own_pid`
pub fn parse_pids(output: &str, own_pid: i32) -> Vec<i32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<i32>().ok())
        .filter(|pid| *pid > 0 && *pid != own_pid)
        .collect()
}
