//! Desktop notifications for recovery outcomes

use recovery::Notifier;
use std::time::Duration;
use tracing::{debug, warn};

const TITLE: &str = "camlink-guard";
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts notifications through `osascript` on macOS and `notify-send`
/// elsewhere
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    enabled: bool,
}

impl DesktopNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Program and arguments that display `message`
    pub fn command(message: &str) -> (&'static str, Vec<String>) {
        if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                escape_applescript(message),
                TITLE
            );
            ("osascript", vec!["-e".to_string(), script])
        } else {
            (
                "notify-send",
                vec![TITLE.to_string(), message.to_string()],
            )
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, message: &str) {
        if !self.enabled {
            debug!("notify: disabled, skipping {:?}", message);
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("notify: no runtime available, dropping {:?}", message);
            return;
        };

        let (program, args) = Self::command(message);
        runtime.spawn(async move {
            match common::run_with_timeout(program, &args, NOTIFY_TIMEOUT).await {
                Ok(output) if output.success() => debug!("notify: posted via {}", program),
                Ok(output) => {
                    if let Err(e) = output.into_result(program) {
                        warn!("notify: {}", e);
                    }
                }
                Err(e) => warn!("notify: {} failed: {}", program, e),
            }
        });
    }
}

/// Escape a string for use inside an AppleScript string literal
fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
