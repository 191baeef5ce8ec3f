//! Configuration management for berth

pub mod schema;

pub use schema::{CacheConfig, Config, GeneralConfig, RuntimeConfig};

use crate::error::{BerthError, BerthResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Name of the project-local configuration file
pub const LOCAL_CONFIG_FILE: &str = ".berth.toml";

/// Environment variable enabling remote cache population
pub const ENV_PUSH: &str = "BERTH_PUSH_IMAGE_CACHE";
/// Environment variable overriding the registry/name prefix
pub const ENV_PREFIX: &str = "BERTH_CACHE_PREFIX";
/// Environment variable overriding the export cache root
pub const ENV_CACHE_DIR: &str = "BERTH_CACHE_DIR";
/// Environment variable selecting the runtime CLI
pub const ENV_ENGINE: &str = "BERTH_ENGINE";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("berth")
            .join("config.toml")
    }

    /// Walk up from `start` looking for a project-local config file
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, creating default if not exists
    pub async fn load(&self) -> BerthResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load a project-local config in place of the global one when given,
    /// then apply environment overrides
    pub async fn load_merged(&self, local: Option<&Path>) -> BerthResult<Config> {
        let mut config = match local {
            Some(path) => {
                debug!("Using local config: {}", path.display());
                self.load_from_file(path).await?
            }
            None => self.load().await?,
        };
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> BerthResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| BerthError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| BerthError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> BerthResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            BerthError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> BerthResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BerthError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `BERTH_*` overrides using the given variable lookup
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(push) = lookup(ENV_PUSH) {
        config.cache.push = push.trim().eq_ignore_ascii_case("true");
    }
    if let Some(prefix) = lookup(ENV_PREFIX).filter(|p| !p.is_empty()) {
        config.cache.prefix = Some(prefix);
    }
    if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|d| !d.is_empty()) {
        config.cache.dir = Some(PathBuf::from(dir));
    }
    if let Some(engine) = lookup(ENV_ENGINE).filter(|e| !e.is_empty()) {
        config.runtime.engine = engine;
    }
}
