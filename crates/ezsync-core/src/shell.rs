// ── Shell command execution ──
//
// Everything that changes the host's network configuration goes through
// `ShellExec`. The trait is the seam: `SystemShell` spawns real processes,
// tests substitute a scripted fake. A non-zero exit is a normal result;
// only a program that cannot be started is an error.

use std::fmt;
use std::future::Future;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::CoreError;

/// Default bound on a single command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit code reported for a command killed on timeout or by a signal.
pub const ABNORMAL_EXIT: i32 = -1;

// ── ShellCommand ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Arg {
    Plain(String),
    Secret(SecretString),
}

/// A program plus arguments. Secret arguments are masked in `Display`.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    program: String,
    args: Vec<Arg>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Plain(arg.into()));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args
            .extend(args.into_iter().map(|a| Arg::Plain(a.into())));
        self
    }

    /// Append an argument that must never be logged.
    pub fn secret_arg(mut self, arg: &SecretString) -> Self {
        self.args.push(Arg::Secret(arg.clone()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// The real argument vector, secrets included.
    pub fn argv(&self) -> Vec<&str> {
        self.args
            .iter()
            .map(|a| match a {
                Arg::Plain(s) => s.as_str(),
                Arg::Secret(s) => s.expose_secret(),
            })
            .collect()
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            match arg {
                Arg::Plain(s) if s.is_empty() || s.contains(char::is_whitespace) => {
                    write!(f, " '{s}'")?;
                }
                Arg::Plain(s) => write!(f, " {s}")?,
                Arg::Secret(_) => f.write_str(" ********")?,
            }
        }
        Ok(())
    }
}

// ── CommandOutput ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// ── ShellExec ────────────────────────────────────────────────────────

/// Runs one OS command and captures its output.
pub trait ShellExec: Send + Sync + 'static {
    fn run(
        &self,
        cmd: &ShellCommand,
    ) -> impl Future<Output = Result<CommandOutput, CoreError>> + Send;
}

/// `ShellExec` backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct SystemShell {
    timeout: Duration,
}

impl Default for SystemShell {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl SystemShell {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ShellExec for SystemShell {
    async fn run(&self, cmd: &ShellCommand) -> Result<CommandOutput, CoreError> {
        debug!(command = %cmd, "running command");

        let child = Command::new(cmd.program())
            .args(cmd.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::CommandUnavailable {
                program: cmd.program().to_owned(),
                reason: if e.kind() == ErrorKind::NotFound {
                    "not found on PATH".into()
                } else {
                    e.to_string()
                },
            })?;

        let output = if let Ok(result) =
            tokio::time::timeout(self.timeout, child.wait_with_output()).await
        {
            let output = result.map_err(|e| CoreError::Internal(format!("{cmd}: {e}")))?;
            CommandOutput {
                exit_code: output.status.code().unwrap_or(ABNORMAL_EXIT),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
        } else {
            warn!(command = %cmd, timeout_secs = self.timeout.as_secs(), "command timed out, killed");
            CommandOutput {
                exit_code: ABNORMAL_EXIT,
                stdout: String::new(),
                stderr: format!("timed out after {}s", self.timeout.as_secs()),
            }
        };

        debug!(
            command = %cmd,
            exit_code = output.exit_code,
            stdout = output.stdout.trim(),
            stderr = output.stderr.trim(),
            "command finished"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn display_masks_secret_arguments() {
        let psk: SecretString = "88888888".to_string().into();
        let cmd = ShellCommand::new("nmcli")
            .args(["device", "wifi", "connect", "ez Share", "password"])
            .secret_arg(&psk);

        let shown = cmd.to_string();
        assert_eq!(
            shown,
            "nmcli device wifi connect 'ez Share' password ********"
        );
        assert!(!shown.contains("88888888"));
        assert_eq!(cmd.argv().last().copied(), Some("88888888"));
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let shell = SystemShell::default();
        let result = shell
            .run(&ShellCommand::new("ezsync-definitely-not-a-real-binary"))
            .await;
        assert!(matches!(
            result,
            Err(CoreError::CommandUnavailable { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_result() {
        let shell = SystemShell::default();
        let output = shell
            .run(&ShellCommand::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_is_killed() {
        let shell = SystemShell::with_timeout(Duration::from_millis(100));
        let output = shell
            .run(&ShellCommand::new("sleep").arg("5"))
            .await
            .unwrap();
        assert_eq!(output.exit_code, ABNORMAL_EXIT);
    }
}
