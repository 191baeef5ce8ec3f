//! Configuration schema for berth
//!
//! Configuration is stored at `~/.config/berth/config.toml`; a project-local
//! `.berth.toml` takes its place when one is found.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Container runtime settings
    pub runtime: RuntimeConfig,

    /// Image and export cache settings
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Container runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runtime CLI to invoke ("docker" or "podman")
    pub engine: String,

    /// Tag prefix for images built from a Dockerfile passed to `run`
    pub container_prefix: String,

    /// Mount point used by `in_dir` when no container path is given
    pub container_dir: String,

    /// Echo background container output to stderr
    pub echo_output: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: "docker".to_string(),
            container_prefix: "localhost/berth-auto-build:".to_string(),
            container_dir: "/.data".to_string(),
            echo_output: true,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Push freshly built entries to the remote registry
    pub push: bool,

    /// Registry/name prefix override (e.g. "ghcr.io/owner/repo")
    pub prefix: Option<String>,

    /// Root directory for exported caches, replacing the `.cache` heuristics
    pub dir: Option<PathBuf>,

    /// Explicit path to the oras binary
    pub oras_binary: Option<PathBuf>,
}
