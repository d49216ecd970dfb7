//! Bounded execution of external tools
//!
//! All collaborators (hub control, frame capture, device inventory) are
//! external programs. They are run with a hard timeout and killed if it
//! expires, so a hung tool can never wedge a recovery attempt.

use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status of the process
    pub status: ExitStatus,
    /// Standard output followed by standard error
    pub combined: String,
}

impl CommandOutput {
    /// Whether the process exited zero
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Convert a non-zero exit into [`crate::Error::CommandFailed`]
    pub fn into_result(self, program: &str) -> crate::Result<String> {
        if self.status.success() {
            Ok(self.combined)
        } else {
            Err(crate::Error::CommandFailed {
                program: program.to_string(),
                status: self.status,
                output: self.combined.trim().to_string(),
            })
        }
    }
}

/// Run `program` with `args`, waiting at most `timeout`
///
/// A non-zero exit is not an error here; callers decide what a failing
/// status means. Spawn failures surface as [`crate::Error::Io`] and an
/// expired timeout as [`crate::Error::Timeout`] (the child is killed).
pub async fn run_with_timeout<S, I, A>(
    program: S,
    args: I,
    timeout: Duration,
) -> crate::Result<CommandOutput>
where
    S: AsRef<OsStr>,
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    let program = program.as_ref();
    let name = program.to_string_lossy().into_owned();

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn()?;
    debug!("exec: spawned {} (timeout {:?})", name, timeout);

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(crate::Error::Timeout {
                program: name,
                after: timeout,
            });
        }
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(CommandOutput {
        status: output.status,
        combined,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let output = run_with_timeout("sh", ["-c", "echo out; echo err >&2"], TIMEOUT)
            .await
            .unwrap();

        assert!(output.success());
        assert!(output.combined.contains("out"));
        assert!(output.combined.contains("err"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_keeps_output() {
        let output = run_with_timeout("sh", ["-c", "echo partial; exit 3"], TIMEOUT)
            .await
            .unwrap();

        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
        assert!(output.combined.contains("partial"));

        let err = output.into_result("sh").unwrap_err();
        assert!(matches!(err, crate::Error::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let started = std::time::Instant::now();
        let result = run_with_timeout("sleep", ["10"], Duration::from_millis(200)).await;

        assert!(matches!(result, Err(crate::Error::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let result =
            run_with_timeout("/nonexistent/camlink-tool", Vec::<&str>::new(), TIMEOUT).await;
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }
}
