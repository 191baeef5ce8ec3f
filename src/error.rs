//! Error types for berth
//!
//! All modules use `BerthResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for berth operations
pub type BerthResult<T> = Result<T, BerthError>;

/// All errors that can occur in berth
#[derive(Error, Debug)]
pub enum BerthError {
    // Environment errors
    #[error("Required CLI not found: {name}. {hint}")]
    CliNotFound { name: String, hint: String },

    #[error("Repository root not found above {0}")]
    RepoRootNotFound(PathBuf),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Input errors
    #[error("Recipe does not exist: {0}")]
    RecipeNotFound(PathBuf),

    #[error("Invalid pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Empty command")]
    EmptyCommand,

    // Container errors
    #[error("Container failed to start: {0}")]
    ContainerStart(String),

    #[error("Container not started: {0}")]
    ContainerNotStarted(String),

    #[error("Startup hook failed for {name}: {reason}")]
    StartupHook { name: String, reason: String },

    #[error("Log streams closed before a match for {0}")]
    LogStreamClosed(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, exit code: {code}{}", render_output(.stdout, .stderr))]
    CommandExecution {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Command cancelled: {0}")]
    Cancelled(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Format captured output the way it is shown to the user on failure
fn render_output(stdout: &str, stderr: &str) -> String {
    let mut out = String::new();
    if stdout.trim().is_empty() {
        out.push_str("\n<no output>");
    } else {
        out.push_str("\n\n");
        out.push_str(stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        out.push_str("\nSTDERR:\n");
        out.push_str(stderr.trim_end());
    }
    out
}

impl BerthError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error with captured output
    pub fn command_exec(
        command: impl Into<String>,
        code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandExecution {
            command: command.into(),
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Captured stderr of a failed external command, if any
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::CommandExecution { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CliNotFound { name, .. } if name == "oras" => {
                Some("Install oras from https://oras.land or set cache.oras_binary")
            }
            Self::CliNotFound { .. } => Some("Install docker or podman, or set runtime.engine"),
            Self::RepoRootNotFound(_) => Some("Run inside a git checkout or set BERTH_CACHE_PREFIX"),
            _ => None,
        }
    }
}
