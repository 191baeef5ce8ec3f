//! Container runtime abstraction
//!
//! Provides a trait for container operations that can be implemented
//! by different backends (the docker or podman CLI, or a test double).

use crate::error::BerthResult;
use crate::orchestration::spec::RunSpec;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// Abstract container runtime interface
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build `dockerfile` (in its own directory as context) and tag it
    async fn build(&self, dockerfile: &Path, tag: &str) -> BerthResult<()>;

    /// Build `dockerfile` and export the resulting filesystem into `dest`
    async fn build_local(&self, dockerfile: &Path, dest: &Path) -> BerthResult<()>;

    /// Pull an image from its registry
    async fn pull(&self, image: &str) -> BerthResult<()>;

    /// Push an image to its registry
    async fn push(&self, image: &str) -> BerthResult<()>;

    /// Ids of all containers (running or not) whose name matches `name`
    async fn container_ids(&self, name: &str) -> BerthResult<Vec<String>>;

    /// Run a command in a running container, returning its stdout
    async fn exec(&self, container_id: &str, command: &[String]) -> BerthResult<String>;

    /// Run a container in the foreground to completion, returning its stdout
    async fn run(&self, spec: &RunSpec) -> BerthResult<String>;

    /// Command that starts the container; the caller owns its stdio and lifetime
    fn run_command(&self, spec: &RunSpec) -> Command;

    /// Get the human-readable runtime name for display
    fn runtime_name(&self) -> &str;
}
