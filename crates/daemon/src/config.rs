//! Daemon configuration management

use anyhow::{Context, Result, anyhow};
use recovery::health::{DEFAULT_CAPTURE_TIMEOUT, default_input_format, default_inventory_command};
use recovery::{DispatcherConfig, HealthConfig, ResetStage, TriggerDelays, default_ladder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Elgato Cam Link 4K USB IDs
pub const CAM_LINK_VENDOR_ID: &str = "0x0fd9";
pub const CAM_LINK_PRODUCT_ID: &str = "0x007b";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default)]
    pub daemon: DaemonSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub triggers: TriggerSettings,
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub reset: ResetSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub log_level: String,
    /// Send desktop notifications for recovery outcomes
    #[serde(default = "default_true")]
    pub notify: bool,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            notify: true,
        }
    }
}

/// The one device this daemon watches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Name as shown by the device inventory and the hub report
    pub name: String,
    /// Vendor ID, `0x`-prefixed hex
    pub vendor_id: String,
    /// Product ID, `0x`-prefixed hex
    pub product_id: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            name: "Cam Link 4K".to_string(),
            vendor_id: CAM_LINK_VENDOR_ID.to_string(),
            product_id: CAM_LINK_PRODUCT_ID.to_string(),
        }
    }
}

/// Which event sources run and how long each waits before probing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerSettings {
    #[serde(default = "default_true")]
    pub wake: bool,
    #[serde(default = "default_true")]
    pub hotplug: bool,
    #[serde(default = "TriggerSettings::default_wake_delay", with = "duration_serde")]
    pub wake_delay: Duration,
    #[serde(default = "TriggerSettings::default_hotplug_delay", with = "duration_serde")]
    pub hotplug_delay: Duration,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            wake: true,
            hotplug: true,
            wake_delay: Self::default_wake_delay(),
            hotplug_delay: Self::default_hotplug_delay(),
        }
    }
}

impl TriggerSettings {
    fn default_wake_delay() -> Duration {
        TriggerDelays::default().wake
    }

    fn default_hotplug_delay() -> Duration {
        TriggerDelays::default().hotplug
    }
}

/// External tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub uhubctl_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    /// Inventory query, program followed by its arguments
    #[serde(default = "default_inventory_command")]
    pub inventory_command: Vec<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            uhubctl_path: PathBuf::from("uhubctl"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            inventory_command: default_inventory_command(),
        }
    }
}

/// Frame-capture probe parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    #[serde(default = "HealthSettings::default_timeout", with = "duration_serde")]
    pub timeout: Duration,
    #[serde(default = "HealthSettings::default_input_format")]
    pub input_format: String,
    #[serde(default = "HealthSettings::default_video_size")]
    pub video_size: String,
    #[serde(default = "HealthSettings::default_framerate")]
    pub framerate: String,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            timeout: Self::default_timeout(),
            input_format: Self::default_input_format(),
            video_size: Self::default_video_size(),
            framerate: Self::default_framerate(),
        }
    }
}

impl HealthSettings {
    fn default_timeout() -> Duration {
        DEFAULT_CAPTURE_TIMEOUT
    }

    fn default_input_format() -> String {
        default_input_format().to_string()
    }

    fn default_video_size() -> String {
        "1920x1080".to_string()
    }

    fn default_framerate() -> String {
        "59.94".to_string()
    }
}

/// Escalation ladder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetSettings {
    pub stages: Vec<StageSettings>,
}

impl Default for ResetSettings {
    fn default() -> Self {
        Self {
            stages: default_ladder().into_iter().map(StageSettings::from).collect(),
        }
    }
}

/// One ladder stage as written in the config file
///
/// # Example Configuration
/// ```toml
/// [[reset.stages]]
/// name = "quick cycle"
/// off_time = "2s"
/// settle = "3s"
/// both_hubs = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSettings {
    pub name: String,
    #[serde(with = "duration_serde")]
    pub off_time: Duration,
    #[serde(with = "duration_serde")]
    pub settle: Duration,
    #[serde(default)]
    pub both_hubs: bool,
}

impl From<ResetStage> for StageSettings {
    fn from(stage: ResetStage) -> Self {
        Self {
            name: stage.name,
            off_time: stage.off_time,
            settle: stage.settle,
            both_hubs: stage.both_hubs,
        }
    }
}

impl From<&StageSettings> for ResetStage {
    fn from(stage: &StageSettings) -> Self {
        ResetStage::new(stage.name.clone(), stage.off_time, stage.settle, stage.both_hubs)
    }
}

fn default_true() -> bool {
    true
}

/// Durations as human-readable strings ("2s", "1m30s", "500ms")
mod duration_serde {
    use common::duration::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

impl WatchdogConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            expand_path(&p)
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/camlink-guard/config.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: WatchdogConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("camlink-guard").join("config.toml")
        } else {
            PathBuf::from(".config/camlink-guard/config.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.daemon.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.daemon.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.device.name.trim().is_empty() {
            return Err(anyhow!("Device name must not be empty"));
        }
        parse_hex_id(&self.device.vendor_id, "vendor_id")?;
        parse_hex_id(&self.device.product_id, "product_id")?;

        if self.reset.stages.is_empty() {
            return Err(anyhow!("At least one reset stage is required"));
        }
        if let Some(index) = self.reset.stages.iter().position(|s| s.name.trim().is_empty()) {
            return Err(anyhow!("Reset stage {} has an empty name", index + 1));
        }

        Ok(())
    }

    pub fn vendor_id(&self) -> Result<u16> {
        parse_hex_id(&self.device.vendor_id, "vendor_id")
    }

    pub fn product_id(&self) -> Result<u16> {
        parse_hex_id(&self.device.product_id, "product_id")
    }

    /// Parameters for the health probe
    pub fn health_config(&self) -> HealthConfig {
        HealthConfig {
            ffmpeg_path: expand_path(&self.tools.ffmpeg_path),
            device_name: self.device.name.clone(),
            timeout: self.health.timeout,
            inventory_command: self.tools.inventory_command.clone(),
            input_format: self.health.input_format.clone(),
            video_size: self.health.video_size.clone(),
            framerate: self.health.framerate.clone(),
        }
    }

    pub fn uhubctl_path(&self) -> PathBuf {
        expand_path(&self.tools.uhubctl_path)
    }

    /// Settings for the recovery dispatcher
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            device_label: self.device.name.clone(),
            ladder: self.reset.stages.iter().map(ResetStage::from).collect(),
            delays: TriggerDelays {
                wake: self.triggers.wake_delay,
                hotplug: self.triggers.hotplug_delay,
            },
        }
    }
}

/// Parse a `0x`-prefixed 16-bit hex ID (VID or PID)
pub fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    let hex_part = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .ok_or_else(|| {
            anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x0fd9')",
                name,
                id
            )
        })?;

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
}

/// Expand a leading `~` in a configured path
fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}
