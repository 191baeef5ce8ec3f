//! Runtime factory for creating configured collaborators
//!
//! Turns the loaded configuration into the runtime and transfer
//! implementations shared by background processes and the cache.

use crate::config::Config;
use crate::orchestration::cli_runtime::CliRuntime;
use crate::orchestration::runtime::ContainerRuntime;
use crate::orchestration::tools::ToolLocator;
use crate::orchestration::transfer::{ArtifactTransfer, OrasCli};
use std::sync::Arc;

/// Supported runtime engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// The docker CLI
    Docker,
    /// The podman CLI
    Podman,
    /// Any other docker-compatible binary
    Other,
}

impl Engine {
    /// Classify an engine binary name
    pub fn detect(binary: &str) -> Self {
        let name = std::path::Path::new(binary)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match name.as_str() {
            "docker" => Engine::Docker,
            "podman" => Engine::Podman,
            _ => Engine::Other,
        }
    }

    /// Get a human-readable engine name
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Docker => "Docker",
            Engine::Podman => "Podman",
            Engine::Other => "Other",
        }
    }
}

/// Create the container runtime selected by `config.runtime.engine`
pub fn create_runtime(config: &Config) -> Arc<dyn ContainerRuntime> {
    Arc::new(CliRuntime::new(config.runtime.engine.clone()))
}

/// Create the directory artifact transfer
pub fn create_transfer(config: &Config, locator: Arc<ToolLocator>) -> Arc<dyn ArtifactTransfer> {
    Arc::new(OrasCli::new(locator, config.cache.oras_binary.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_detect() {
        assert_eq!(Engine::detect("docker"), Engine::Docker);
        assert_eq!(Engine::detect("/usr/bin/podman"), Engine::Podman);
        assert_eq!(Engine::detect("nerdctl"), Engine::Other);
    }

    #[test]
    fn engine_name() {
        assert_eq!(Engine::Docker.name(), "Docker");
        assert_eq!(Engine::Podman.name(), "Podman");
        assert_eq!(Engine::Other.name(), "Other");
    }

    #[test]
    fn create_runtime_uses_configured_engine() {
        let mut config = Config::default();
        config.runtime.engine = "podman".to_string();
        let runtime = create_runtime(&config);
        assert_eq!(runtime.runtime_name(), "podman");
    }
}
