//! USB hub topology resolution
//!
//! Parses the hub-control tool's enumeration report, which looks like:
//!
//! ```text
//! Current status for hub 2-1 [2109:0813 VIA Labs, Inc. USB3.0 Hub, USB 3.10, 4 ports, ppps]
//!   Port 1: 02a0 power 5gbps Rx.Detect
//!   Port 4: 0203 power 5gbps U0 enable connect [0fd9:007b Elgato Cam Link 4K]
//! Current status for hub 1-1 [2109:2813 VIA Labs, Inc. USB2.0 Hub, USB 2.10, 4 ports, ppps]
//!   Port 4: 0100 power
//! ```
//!
//! Each hub header carries a path and a controller `vid:pid`; each port line
//! carries a port number and whatever the tool knows about the attached
//! device.

use crate::error::{RecoveryError, Result};
use crate::hub::HubControl;
use std::fmt;
use tracing::{debug, info};

const HUB_HEADER: &str = "Current status for hub ";

/// Controller ids of VIA Labs hubs whose USB2 and USB3 halves share port
/// numbering.
pub const COMPANION_CONTROLLERS: [&str; 2] = ["2109:2813", "2109:0813"];

/// Where the device is attached: a hub path and a 1-based port on it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceLocation {
    pub hub: String,
    pub port: u16,
}

impl fmt::Display for DeviceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hub {} port {}", self.hub, self.port)
    }
}

/// One hub section of the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubEntry {
    /// Topological path, e.g. `2-1.4`
    pub path: String,
    /// Controller `vid:pid`
    pub controller: String,
    pub ports: Vec<PortEntry>,
}

/// One port line of the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub number: u16,
    /// Everything after `Port N:`, including the device description
    pub label: String,
}

/// Parsed enumeration report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubReport {
    pub hubs: Vec<HubEntry>,
}

impl HubReport {
    /// Parse the tool's report
    ///
    /// Lines that are neither hub headers nor port lines are ignored, as are
    /// port lines that appear before the first hub header.
    pub fn parse(report: &str) -> Self {
        let mut hubs: Vec<HubEntry> = Vec::new();

        for line in report.lines() {
            if let Some((path, controller)) = parse_hub_header(line) {
                hubs.push(HubEntry {
                    path,
                    controller,
                    ports: Vec::new(),
                });
            } else if let Some(port) = parse_port_line(line)
                && let Some(current) = hubs.last_mut()
            {
                current.ports.push(port);
            }
        }

        Self { hubs }
    }

    /// Run the tool and parse its report
    pub async fn enumerate<H: HubControl>(hub_control: &H) -> Result<Self> {
        let raw = hub_control.enumerate().await?;
        let report = Self::parse(&raw);
        debug!("topology: enumerated {} hubs", report.hubs.len());
        Ok(report)
    }

    /// First port, scanning in report order, whose label mentions `device_label`
    pub fn locate(&self, device_label: &str) -> Result<DeviceLocation> {
        self.hubs
            .iter()
            .find_map(|hub| {
                hub.ports
                    .iter()
                    .find(|port| port.label.contains(device_label))
                    .map(|port| DeviceLocation {
                        hub: hub.path.clone(),
                        port: port.number,
                    })
            })
            .ok_or_else(|| RecoveryError::DeviceNotFound(device_label.to_string()))
    }

    /// A different hub with a companion controller exposing the same port number
    ///
    /// `None` is not an error: most hubs have no companion.
    pub fn companion_of(&self, location: &DeviceLocation) -> Option<String> {
        let companion = self
            .hubs
            .iter()
            .filter(|hub| hub.path != location.hub)
            .filter(|hub| COMPANION_CONTROLLERS.contains(&hub.controller.as_str()))
            .find(|hub| hub.ports.iter().any(|port| port.number == location.port))
            .map(|hub| hub.path.clone());

        if let Some(path) = &companion {
            info!("topology: found companion hub at {}", path);
        }
        companion
    }
}

/// `Current status for hub <path> [<vid:pid> ...` -> (path, vid:pid)
fn parse_hub_header(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix(HUB_HEADER)?;
    let (path, rest) = rest.split_once(char::is_whitespace)?;
    if path.is_empty() || !path.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
        return None;
    }

    let rest = rest.trim_start().strip_prefix('[')?;
    let controller: String = rest
        .chars()
        .take_while(|c| c.is_ascii_hexdigit() || *c == ':')
        .collect();
    if controller.is_empty() {
        return None;
    }

    Some((path.to_string(), controller.to_ascii_lowercase()))
}

/// `  Port <n>: <label>` -> PortEntry; requires leading indentation
fn parse_port_line(line: &str) -> Option<PortEntry> {
    if !line.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = line.trim_start().strip_prefix("Port")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let (number, label) = rest.trim_start().split_once(':')?;
    let number: u16 = number.parse().ok()?;
    if number == 0 {
        return None;
    }

    Some(PortEntry {
        number,
        label: label.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIA_REPORT: &str = "\
Current status for hub 2-1 [2109:0813 VIA Labs, Inc. USB3.0 Hub, USB 3.10, 4 ports, ppps]
  Port 1: 02a0 power 5gbps Rx.Detect
  Port 4: 0203 power 5gbps U0 enable connect [0fd9:007b Elgato Cam Link 4K 0004A1B2C3]
Current status for hub 1-1 [2109:2813 VIA Labs, Inc. USB2.0 Hub, USB 2.10, 4 ports, ppps]
  Port 1: 0100 power
  Port 4: 0100 power
";

    #[test]
    fn test_parse_headers_and_ports() {
        let report = HubReport::parse(VIA_REPORT);
        assert_eq!(report.hubs.len(), 2);
        assert_eq!(report.hubs[0].path, "2-1");
        assert_eq!(report.hubs[0].controller, "2109:0813");
        assert_eq!(report.hubs[0].ports.len(), 2);
        assert_eq!(report.hubs[0].ports[1].number, 4);
        assert!(report.hubs[0].ports[1].label.contains("Cam Link 4K"));
    }

    #[test]
    fn test_locate_and_companion() {
        let report = HubReport::parse(VIA_REPORT);
        let location = report.locate("Cam Link 4K").unwrap();
        assert_eq!(
            location,
            DeviceLocation {
                hub: "2-1".to_string(),
                port: 4
            }
        );
        assert_eq!(report.companion_of(&location).as_deref(), Some("1-1"));
    }

    #[test]
    fn test_locate_not_found() {
        let report = HubReport::parse(VIA_REPORT);
        assert!(matches!(
            report.locate("HD60 S+"),
            Err(RecoveryError::DeviceNotFound(label)) if label == "HD60 S+"
        ));
        assert!(HubReport::parse("").locate("Cam Link 4K").is_err());
    }

    #[test]
    fn test_port_lines_before_any_hub_are_ignored() {
        let report = HubReport::parse("  Port 1: 0103 power enable connect [0fd9:007b Cam Link 4K]\n");
        assert!(report.hubs.is_empty());
        assert!(report.locate("Cam Link 4K").is_err());
    }

    #[test]
    fn test_first_match_wins() {
        let text = "\
Current status for hub 3 [1d6b:0002 Linux Foundation]
  Port 2: 0103 power enable connect [0fd9:007b Cam Link 4K A]
Current status for hub 4 [1d6b:0003 Linux Foundation]
  Port 1: 0203 power enable connect [0fd9:007b Cam Link 4K B]
";
        let location = HubReport::parse(text).locate("Cam Link 4K").unwrap();
        assert_eq!(location.hub, "3");
        assert_eq!(location.port, 2);
    }

    #[test]
    fn test_no_companion_for_other_controllers() {
        let text = "\
Current status for hub 1 [05e3:0610 GenesysLogic USB2.1 Hub]
  Port 3: 0103 power enable connect [0fd9:007b Cam Link 4K]
Current status for hub 2 [05e3:0626 GenesysLogic USB3.1 Hub]
  Port 3: 02a0 power
";
        let report = HubReport::parse(text);
        let location = report.locate("Cam Link 4K").unwrap();
        assert_eq!(report.companion_of(&location), None);
    }

    #[test]
    fn test_companion_requires_matching_port() {
        let text = "\
Current status for hub 2-1 [2109:0813 VIA Labs, Inc. USB3.0 Hub]
  Port 4: 0203 power 5gbps U0 enable connect [0fd9:007b Cam Link 4K]
Current status for hub 1-1 [2109:2813 VIA Labs, Inc. USB2.0 Hub]
  Port 1: 0100 power
  Port 2: 0100 power
";
        let report = HubReport::parse(text);
        let location = report.locate("Cam Link 4K").unwrap();
        assert_eq!(report.companion_of(&location), None);
    }

    #[test]
    fn test_malformed_lines_ignored() {
        assert_eq!(parse_hub_header("Current status for hub [2109:0813]"), None);
        assert_eq!(parse_hub_header("Current status for hub abc [2109:0813]"), None);
        assert_eq!(parse_hub_header("Current status for hub 1 2109:0813"), None);
        assert_eq!(parse_port_line("Port 1: unindented"), None);
        assert_eq!(parse_port_line("  Port x: 0100 power"), None);
        assert_eq!(parse_port_line("  Port 0: 0100 power"), None);
        assert_eq!(parse_port_line("  Ports 1: 0100 power"), None);
    }

    #[test]
    fn test_same_path_is_not_a_companion() {
        let report = HubReport::parse(
            "\
Current status for hub 2-1 [2109:0813 VIA Labs, Inc. USB3.0 Hub, USB 3.10, 4 ports, ppps]
  Port 4: 0203 power 5gbps U0 enable connect [0fd9:007b Elgato Cam Link 4K]
Current status for hub 2-1 [2109:2813 VIA Labs, Inc. USB2.0 Hub, USB 2.10, 4 ports, ppps]
  Port 4: 0100 power
",
        );
        let location = report.locate("Cam Link 4K").unwrap();

        assert_eq!(location.hub, "2-1");
        assert_eq!(report.companion_of(&location), None);
    }
}
