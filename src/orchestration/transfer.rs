//! Artifact transfer for exported cache directories
//!
//! Directories are stored in an OCI registry with `oras`. The binary is
//! resolved lazily, so image-only workflows never require it.

use crate::error::BerthResult;
use crate::orchestration::command::{CommandRunner, ExternalCommand};
use crate::orchestration::tools::ToolLocator;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Moves directory artifacts between the local filesystem and a registry
#[async_trait]
pub trait ArtifactTransfer: Send + Sync {
    /// Pull `reference` into `dest`
    async fn pull_dir(&self, reference: &str, dest: &Path) -> BerthResult<()>;

    /// Push the contents of `src` as `reference`
    async fn push_dir(&self, reference: &str, src: &Path) -> BerthResult<()>;
}

/// [`ArtifactTransfer`] implemented with the `oras` CLI
pub struct OrasCli {
    locator: Arc<ToolLocator>,
    configured: Option<PathBuf>,
    runner: CommandRunner,
}

impl OrasCli {
    /// Create a transfer that resolves `oras` through `locator`
    pub fn new(locator: Arc<ToolLocator>, configured: Option<PathBuf>) -> Self {
        Self {
            locator,
            configured,
            runner: CommandRunner::new(),
        }
    }

    fn binary(&self) -> BerthResult<PathBuf> {
        self.locator.locate("oras", self.configured.as_deref())
    }

    fn pull_command(binary: PathBuf, reference: &str, dest: &Path) -> ExternalCommand {
        ExternalCommand::new(binary)
            .args(["pull", "--output"])
            .arg(dest.display().to_string())
            .args(insecure_flag(reference))
            .arg(reference)
            .quiet()
    }

    fn push_command(binary: PathBuf, reference: &str, src: &Path) -> ExternalCommand {
        ExternalCommand::new(binary)
            .args(["push", reference, "."])
            .args(insecure_flag(reference))
            .current_dir(src)
    }
}

/// Plain-HTTP flag for loopback registries
fn insecure_flag(reference: &str) -> Option<&'static str> {
    reference.starts_with("localhost:").then_some("--insecure")
}

#[async_trait]
impl ArtifactTransfer for OrasCli {
    async fn pull_dir(&self, reference: &str, dest: &Path) -> BerthResult<()> {
        debug!("Pulling {} to {}", reference, dest.display());
        let cmd = Self::pull_command(self.binary()?, reference, dest);
        self.runner.run(&cmd).await?;
        Ok(())
    }

    async fn push_dir(&self, reference: &str, src: &Path) -> BerthResult<()> {
        info!("Pushing {} from {}", reference, src.display());
        let cmd = Self::push_command(self.binary()?, reference, src);
        self.runner.run(&cmd).await?;
        Ok(())
    }
}
