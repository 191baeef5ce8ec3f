//! CLI command implementations

pub mod config;
pub mod export;
pub mod key;
pub mod pull;
pub mod run;

pub use config::execute as config;
pub use export::execute as export;
pub use key::execute as key;
pub use pull::execute as pull;
pub use run::execute as run;

use crate::cache::{CacheSettings, ImageCache, RepoIdentity};
use crate::config::Config;
use crate::error::{BerthError, BerthResult};
use crate::orchestration::{create_runtime, create_transfer, ToolLocator};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Cache for the repository containing `recipe`
fn open_cache(recipe: &Path, config: &Config) -> BerthResult<ImageCache> {
    if !recipe.is_file() {
        return Err(BerthError::RecipeNotFound(recipe.to_path_buf()));
    }
    let abs = std::path::absolute(recipe)
        .map_err(|e| BerthError::io(format!("resolving {}", recipe.display()), e))?;
    let identity = repo_identity(abs.parent().unwrap_or(&abs), config.cache.prefix.as_deref())?;

    let runtime = create_runtime(config);
    let transfer = create_transfer(config, Arc::new(ToolLocator::new()));
    Ok(ImageCache::new(
        runtime,
        transfer,
        identity,
        CacheSettings::from_config(&config.cache),
    ))
}

/// Repository identity for a recipe directory
///
/// With a prefix override the key does not need a checkout, so the recipe
/// directory stands in as the root.
fn repo_identity(dir: &Path, prefix: Option<&str>) -> BerthResult<RepoIdentity> {
    match RepoIdentity::discover(dir) {
        Err(BerthError::RepoRootNotFound(_)) if prefix.is_some_and(|p| !p.is_empty()) => {
            debug!("No git checkout above {}, keying from the recipe directory", dir.display());
            Ok(RepoIdentity::new(dir, None))
        }
        other => other,
    }
}
