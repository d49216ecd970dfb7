//! Device health probe
//!
//! A device is healthy when it is listed by the host's device inventory and
//! an external capture tool can grab exactly one frame from it within a
//! bounded time. The probe never retries; retrying is the job of the reset
//! ladder.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Capture timeout used when none is configured
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound for the inventory query
const INVENTORY_TIMEOUT: Duration = Duration::from_secs(15);

/// Anything that can answer "is the device usable right now?"
pub trait HealthProbe: Send + Sync {
    fn check(&self) -> impl Future<Output = bool> + Send;
}

/// Parameters needed to evaluate device health
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// Frame-capture tool (ffmpeg)
    pub ffmpeg_path: PathBuf,
    /// Device name as reported by the inventory and accepted by the capture tool
    pub device_name: String,
    /// Capture timeout; zero means [`DEFAULT_CAPTURE_TIMEOUT`]
    pub timeout: Duration,
    /// Inventory query, program followed by its arguments
    pub inventory_command: Vec<String>,
    /// Capture input format (`avfoundation`, `v4l2`, ...)
    pub input_format: String,
    /// Requested resolution, `WIDTHxHEIGHT`
    pub video_size: String,
    /// Requested frame rate
    pub framerate: String,
}

impl HealthConfig {
    /// Config with platform defaults for everything but the tool and device
    pub fn new(ffmpeg_path: impl Into<PathBuf>, device_name: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            device_name: device_name.into(),
            timeout: DEFAULT_CAPTURE_TIMEOUT,
            inventory_command: default_inventory_command(),
            input_format: default_input_format().to_string(),
            video_size: "1920x1080".to_string(),
            framerate: "59.94".to_string(),
        }
    }

    /// Timeout actually applied to the capture command
    pub fn capture_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_CAPTURE_TIMEOUT
        } else {
            self.timeout
        }
    }

    /// Arguments for a single-frame capture into the null muxer
    pub fn capture_args(&self) -> Vec<String> {
        [
            "-f",
            self.input_format.as_str(),
            "-video_size",
            self.video_size.as_str(),
            "-framerate",
            self.framerate.as_str(),
            "-i",
            self.device_name.as_str(),
            "-frames:v",
            "1",
            "-f",
            "null",
            "-",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

/// Inventory query for the current platform
pub fn default_inventory_command() -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec!["system_profiler".to_string(), "SPCameraDataType".to_string()]
    } else {
        vec!["v4l2-ctl".to_string(), "--list-devices".to_string()]
    }
}

/// Capture input format for the current platform
pub fn default_input_format() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else {
        "v4l2"
    }
}

/// Why a probe failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthFailure {
    /// The inventory query itself could not be run (treated as not present)
    InventoryUnavailable(String),
    /// The inventory ran but does not list the device
    NotListed,
    /// The capture tool could not be started or exited non-zero
    CaptureFailed(String),
    /// The capture tool did not finish in time
    CaptureTimedOut(Duration),
}

impl HealthFailure {
    /// Which sub-check failed
    pub fn stage(&self) -> &'static str {
        match self {
            HealthFailure::InventoryUnavailable(_) | HealthFailure::NotListed => "presence",
            HealthFailure::CaptureFailed(_) | HealthFailure::CaptureTimedOut(_) => "capture",
        }
    }
}

impl fmt::Display for HealthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthFailure::InventoryUnavailable(reason) => {
                write!(f, "device inventory unavailable: {}", reason)
            }
            HealthFailure::NotListed => write!(f, "device not listed in inventory"),
            HealthFailure::CaptureFailed(reason) => write!(f, "frame capture failed: {}", reason),
            HealthFailure::CaptureTimedOut(after) => {
                write!(f, "frame capture timed out after {:?}", after)
            }
        }
    }
}

/// Run both sub-checks, presence first
pub async fn evaluate(config: &HealthConfig) -> Result<(), HealthFailure> {
    check_presence(config).await?;
    check_capture(config).await
}

/// Returns true if the device is listed and can produce a frame
pub async fn check(config: &HealthConfig) -> bool {
    match evaluate(config).await {
        Ok(()) => {
            debug!("health: {:?} passed presence and capture", config.device_name);
            true
        }
        Err(failure) => {
            warn!(
                "health: {:?} failed {} check: {}",
                config.device_name,
                failure.stage(),
                failure
            );
            false
        }
    }
}

impl HealthProbe for HealthConfig {
    async fn check(&self) -> bool {
        check(self).await
    }
}

async fn check_presence(config: &HealthConfig) -> Result<(), HealthFailure> {
    let Some((program, args)) = config.inventory_command.split_first() else {
        return Err(HealthFailure::InventoryUnavailable(
            "no inventory command configured".to_string(),
        ));
    };

    let output = common::run_with_timeout(program, args, INVENTORY_TIMEOUT)
        .await
        .map_err(|e| HealthFailure::InventoryUnavailable(e.to_string()))?;
    let listing = output
        .into_result(program)
        .map_err(|e| HealthFailure::InventoryUnavailable(e.to_string()))?;

    if listing.contains(&config.device_name) {
        Ok(())
    } else {
        Err(HealthFailure::NotListed)
    }
}

async fn check_capture(config: &HealthConfig) -> Result<(), HealthFailure> {
    let timeout = config.capture_timeout();
    let output = common::run_with_timeout(&config.ffmpeg_path, config.capture_args(), timeout)
        .await
        .map_err(|e| match e {
            common::Error::Timeout { after, .. } => HealthFailure::CaptureTimedOut(after),
            other => HealthFailure::CaptureFailed(other.to_string()),
        })?;

    if output.success() {
        Ok(())
    } else {
        Err(HealthFailure::CaptureFailed(format!(
            "exited with {}",
            output.status
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listed_config(ffmpeg: &str) -> HealthConfig {
        let mut config = HealthConfig::new(ffmpeg, "Cam Link 4K");
        config.inventory_command = vec![
            "echo".to_string(),
            "Video: Cam Link 4K (Elgato)".to_string(),
        ];
        config
    }

    #[test]
    fn test_capture_args_request_one_frame() {
        let config = HealthConfig::new("ffmpeg", "Cam Link 4K");
        let args = config.capture_args();

        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "Cam Link 4K");
        let frames = args.iter().position(|a| a == "-frames:v").unwrap();
        assert_eq!(args[frames + 1], "1");
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let mut config = HealthConfig::new("ffmpeg", "Cam Link 4K");
        config.timeout = Duration::ZERO;
        assert_eq!(config.capture_timeout(), DEFAULT_CAPTURE_TIMEOUT);

        config.timeout = Duration::from_secs(7);
        assert_eq!(config.capture_timeout(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_unreachable_capture_tool_fails_capture_stage() {
        let config = listed_config("/nonexistent/bin/ffmpeg");

        let failure = evaluate(&config).await.unwrap_err();
        assert_eq!(failure.stage(), "capture");
        assert!(matches!(failure, HealthFailure::CaptureFailed(_)));
        assert!(!check(&config).await);
    }

    #[tokio::test]
    async fn test_unlisted_device_fails_presence_stage() {
        let mut config = listed_config("true");
        config.inventory_command = vec!["echo".to_string(), "FaceTime HD Camera".to_string()];

        assert_eq!(evaluate(&config).await, Err(HealthFailure::NotListed));
    }

    #[tokio::test]
    async fn test_inventory_failure_is_fail_closed() {
        let mut config = listed_config("true");
        config.inventory_command = vec!["/nonexistent/bin/system_profiler".to_string()];

        let failure = evaluate(&config).await.unwrap_err();
        assert!(matches!(failure, HealthFailure::InventoryUnavailable(_)));
        assert_eq!(failure.stage(), "presence");

        config.inventory_command.clear();
        assert!(matches!(
            evaluate(&config).await,
            Err(HealthFailure::InventoryUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_nonzero_capture_exit_fails() {
        let config = listed_config("false");
        assert!(matches!(
            evaluate(&config).await,
            Err(HealthFailure::CaptureFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_healthy_device() {
        let config = listed_config("true");
        assert_eq!(evaluate(&config).await, Ok(()));
        assert!(HealthProbe::check(&config).await);
    }
}
