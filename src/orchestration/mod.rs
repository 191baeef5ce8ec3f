//! Orchestration module for external collaborators
//!
//! Wraps the container runtime CLI and the artifact-transfer CLI:
//! - `command`: captured, cancellable external command execution
//! - `runtime`/`cli_runtime`: build, run, ps, exec, pull, push
//! - `transfer`: pull and push directories with oras

pub mod command;
mod cli_runtime;
mod factory;
mod runtime;
mod spec;
pub mod tools;
mod transfer;

pub use cli_runtime::CliRuntime;
pub use command::{shutdown_token, CommandOutput, CommandRunner, ExternalCommand};
pub use factory::{create_runtime, create_transfer, Engine};
pub use runtime::ContainerRuntime;
pub use spec::RunSpec;
pub use tools::ToolLocator;
pub use transfer::{ArtifactTransfer, OrasCli};
