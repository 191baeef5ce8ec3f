//! External command execution
//!
//! Every call to the container runtime or the artifact-transfer tool goes
//! through [`CommandRunner`]: output is captured, a non-zero exit becomes a
//! [`BerthError::CommandExecution`] carrying both streams verbatim, and a
//! process-wide cancellation token aborts whatever is still pending.

use crate::error::{BerthError, BerthResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Process-wide token; cancelling it aborts every pending external command
pub fn shutdown_token() -> &'static CancellationToken {
    static TOKEN: OnceLock<CancellationToken> = OnceLock::new();
    TOKEN.get_or_init(CancellationToken::new)
}

/// A command line to execute, with an optional working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: PathBuf,
    args: Vec<String>,
    dir: Option<PathBuf>,
    quiet: bool,
}

impl ExternalCommand {
    /// Create a command for the given program
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            quiet: false,
        }
    }

    /// Append a single argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run in the given directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Log the command line at debug instead of info
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Arguments passed to the program
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if set
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Human-readable command line, quoting arguments that contain spaces
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        for arg in &self.args {
            if arg.contains(' ') {
                if arg.contains('\'') {
                    parts.push(format!("\"{}\"", arg));
                } else {
                    parts.push(format!("'{}'", arg));
                }
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Captured output of a successful command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Stdout with surrounding whitespace removed
    pub fn trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Runs external commands, honoring a cancellation token
#[derive(Debug, Clone)]
pub struct CommandRunner {
    cancel: CancellationToken,
}

impl CommandRunner {
    /// Create a runner tied to the process-wide shutdown token
    pub fn new() -> Self {
        Self {
            cancel: shutdown_token().child_token(),
        }
    }

    /// Create a runner with its own token
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// The token aborting this runner's commands
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Execute a command to completion, capturing stdout and stderr
    pub async fn run(&self, command: &ExternalCommand) -> BerthResult<CommandOutput> {
        let line = command.display();
        if command.quiet {
            debug!("$ {}", line);
        } else {
            info!("$ {}", line);
        }

        if self.cancel.is_cancelled() {
            return Err(BerthError::Cancelled(line));
        }

        let child = command
            .to_command()
            .spawn()
            .map_err(|e| BerthError::command_failed(line.clone(), e))?;

        // Dropping the wait future on cancellation kills the child (kill_on_drop)
        let output = tokio::select! {
            output = child.wait_with_output() => {
                output.map_err(|e| BerthError::command_failed(line.clone(), e))?
            }
            _ = self.cancel.cancelled() => {
                debug!("Cancelled: {}", line);
                return Err(BerthError::Cancelled(line));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(BerthError::command_exec(
                line,
                output.status.code().unwrap_or(-1),
                stdout,
                stderr,
            ))
        }
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_spaces() {
        let cmd = ExternalCommand::new("docker")
            .args(["run", "with space"])
            .arg("it's here");
        assert_eq!(cmd.display(), "docker run 'with space' \"it's here\"");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_captures_stdout() {
        let runner = CommandRunner::with_token(CancellationToken::new());
        let out = runner
            .run(&ExternalCommand::new("sh").args(["-c", "echo hello; echo warn >&2"]))
            .await
            .unwrap();
        assert_eq!(out.trimmed(), "hello");
        assert_eq!(out.stderr.trim(), "warn");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_failure_carries_output() {
        let runner = CommandRunner::with_token(CancellationToken::new());
        let err = runner
            .run(&ExternalCommand::new("sh").args(["-c", "echo partial; echo bad >&2; exit 3"]))
            .await
            .unwrap_err();
        match err {
            BerthError::CommandExecution {
                code,
                stdout,
                stderr,
                ..
            } => {
                assert_eq!(code, 3);
                assert_eq!(stdout.trim(), "partial");
                assert_eq!(stderr.trim(), "bad");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_respects_current_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = CommandRunner::with_token(CancellationToken::new());
        let out = runner
            .run(&ExternalCommand::new("pwd").current_dir(dir.path()))
            .await
            .unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(PathBuf::from(out.trimmed()).canonicalize().unwrap(), expected);
    }

    #[tokio::test]
    async fn missing_binary_is_command_failed() {
        let runner = CommandRunner::with_token(CancellationToken::new());
        let err = runner
            .run(&ExternalCommand::new("berth-definitely-not-a-binary"))
            .await
            .unwrap_err();
        assert!(matches!(err, BerthError::CommandFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_aborts_pending_command() {
        let token = CancellationToken::new();
        let runner = CommandRunner::with_token(token.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            token.cancel();
        });

        let err = runner
            .run(&ExternalCommand::new("sleep").arg("10"))
            .await
            .unwrap_err();
        assert!(matches!(err, BerthError::Cancelled(_)));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_error_names_the_command() {
        let token = CancellationToken::new();
        token.cancel();
        let runner = CommandRunner::with_token(token);
        let err = runner
            .run(&ExternalCommand::new("docker").args(["pull", "alpine"]).quiet())
            .await
            .unwrap_err();
        match err {
            BerthError::Cancelled(line) => assert_eq!(line, "docker pull alpine"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
