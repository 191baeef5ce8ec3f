//! Tiered image and export cache
//!
//! Both entry points resolve a content-addressed key and then walk the
//! tiers in order: local directory (exports only), remote registry, local
//! build, and finally an optional push back to the registry. A miss at any
//! tier is not an error; only malformed input and build failures are.

use crate::cache::filter::KeepFilter;
use crate::cache::fingerprint::{Fingerprinter, Sha256Fingerprinter};
use crate::cache::flight::KeyLocks;
use crate::cache::key::{image_cache_name, RepoIdentity};
use crate::cache::layout::find_cache_dir;
use crate::config::CacheConfig;
use crate::error::{BerthError, BerthResult};
use crate::orchestration::{ArtifactTransfer, ContainerRuntime};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// Content type suffix of exported directory references
pub const EXPORT_CONTENT_TYPE: &str = "dir";

/// Caller-owned cache behavior switches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSettings {
    /// Push freshly built entries to the registry
    pub push: bool,
    /// Registry/name prefix replacing the one derived from the repository
    pub prefix: Option<String>,
    /// Root replacing the `.cache` directories for exports
    pub dir: Option<PathBuf>,
}

impl CacheSettings {
    /// Settings taken from the `[cache]` config section
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            push: config.push,
            prefix: config.prefix.clone(),
            dir: config.dir.clone(),
        }
    }
}

/// A resolved cache key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheKey {
    /// Registry reference, `<prefix>/<path>[-<type>]:<fingerprint>`
    pub reference: String,
    /// Fingerprint of the recipe content
    pub fingerprint: String,
    /// Absolute path of the recipe
    pub recipe: PathBuf,
    /// Local directory of an export entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Which tier satisfied an export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    Remote,
    Built,
}

/// Content-addressable cache of images and exported build output
pub struct ImageCache {
    runtime: Arc<dyn ContainerRuntime>,
    transfer: Arc<dyn ArtifactTransfer>,
    fingerprinter: Arc<dyn Fingerprinter>,
    identity: RepoIdentity,
    settings: CacheSettings,
    locks: KeyLocks,
}

impl ImageCache {
    /// Create a cache for recipes inside the `identity` repository
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        transfer: Arc<dyn ArtifactTransfer>,
        identity: RepoIdentity,
        settings: CacheSettings,
    ) -> Self {
        Self {
            runtime,
            transfer,
            fingerprinter: Arc::new(Sha256Fingerprinter),
            identity,
            settings,
            locks: KeyLocks::new(),
        }
    }

    /// Replace the fingerprint provider
    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    /// Settings in effect
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    fn prefix(&self) -> String {
        self.identity.registry_prefix(self.settings.prefix.as_deref())
    }

    /// Key of the image built from `recipe`
    pub fn image_key(&self, recipe: &Path) -> BerthResult<CacheKey> {
        let abs = require_recipe(recipe)?;
        let fingerprint = self.fingerprinter.fingerprint(&[abs.clone()])?;
        let reference = image_cache_name(&self.prefix(), &self.identity.root, &abs, None, &fingerprint)?;
        Ok(CacheKey {
            reference,
            fingerprint,
            recipe: abs,
            dir: None,
        })
    }

    /// Key of the directory exported from `recipe` and its build context
    pub fn export_key(&self, recipe: &Path) -> BerthResult<CacheKey> {
        let abs = require_recipe(recipe)?;
        let context = abs.parent().unwrap_or(Path::new("/")).to_path_buf();
        let fingerprint = self.fingerprinter.fingerprint(&[abs.clone(), context])?;
        let reference = image_cache_name(
            &self.prefix(),
            &self.identity.root,
            &abs,
            Some(EXPORT_CONTENT_TYPE),
            &fingerprint,
        )?;
        let dir = find_cache_dir(&abs, &fingerprint, self.settings.dir.as_deref());
        Ok(CacheKey {
            reference,
            fingerprint,
            recipe: abs,
            dir: Some(dir),
        })
    }

    /// Image reference for `recipe`, pulled from the registry or built locally
    pub async fn pull_cached(&self, recipe: &Path) -> BerthResult<String> {
        let key = self.image_key(recipe)?;
        let reference = key.reference;
        let _guard = self.locks.lock(&reference).await;

        match self.runtime.pull(&reference).await {
            Ok(()) => {
                info!("Cache hit: {} pulled from registry", reference);
                return Ok(reference);
            }
            Err(e @ BerthError::Cancelled(_)) => return Err(e),
            Err(e) => debug!("Pull of {} failed: {}", reference, e),
        }

        info!("Cache miss, building: {}", reference);
        self.runtime.build(&key.recipe, &reference).await?;

        if self.settings.push {
            info!("Pushing image: {}", reference);
            if let Err(e) = self.runtime.push(&reference).await {
                warn!("Unable to push image {}: {}", reference, e);
            }
        }
        Ok(reference)
    }

    /// Directory holding the build output of `recipe`, filtered to `keep`
    ///
    /// The directory is only ever created complete: pulls and builds land in
    /// a sibling staging directory that is renamed into place on success.
    pub async fn export_cached(&self, recipe: &Path, keep: &[String]) -> BerthResult<PathBuf> {
        let filter = KeepFilter::new(keep)?;
        let key = self.export_key(recipe)?;
        let dir = key
            .dir
            .clone()
            .ok_or_else(|| BerthError::Internal("export key without directory".to_string()))?;

        debug!("Checking cache dir: {}", dir.display());
        if dir.is_dir() {
            debug!("Fingerprint matches, returning {}", dir.display());
            return Ok(dir);
        }

        let _guard = self.locks.lock(&key.reference).await;
        if dir.is_dir() {
            return Ok(dir);
        }

        let staging = staging_dir(&dir).await?;
        let fill = match self.fill_export(&key, &staging, &filter).await {
            Ok(fill) => fill,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&staging, &dir).await {
            let _ = fs::remove_dir_all(&staging).await;
            // another process finished the same entry first
            if dir.is_dir() {
                return Ok(dir);
            }
            return Err(BerthError::io(format!("Failed to finalize {}", dir.display()), e));
        }

        if fill == Fill::Built && self.settings.push {
            if let Err(e) = self.transfer.push_dir(&key.reference, &dir).await {
                warn!("Unable to push {}: {}", key.reference, e);
            }
        }
        Ok(dir)
    }

    async fn fill_export(&self, key: &CacheKey, staging: &Path, filter: &KeepFilter) -> BerthResult<Fill> {
        let reference = &key.reference;

        match self.transfer.pull_dir(reference, staging).await {
            Ok(()) if !is_empty_dir(staging).await? => {
                info!("Restored from cache: {} to {}", reference, staging.display());
                return Ok(Fill::Remote);
            }
            Ok(()) => debug!("Pull of {} produced nothing", reference),
            Err(e @ BerthError::Cancelled(_)) => return Err(e),
            Err(e) => debug!("Pull of {} failed: {}", reference, e),
        }

        // discard anything a failed pull left behind
        reset_dir(staging).await?;

        info!("Cache miss, building: {}", key.recipe.display());
        self.runtime.build_local(&key.recipe, staging).await?;

        let removed = filter.apply(staging)?;
        if removed > 0 {
            debug!("Filtered {} files from {}", removed, reference);
        }
        Ok(Fill::Built)
    }
}

fn require_recipe(recipe: &Path) -> BerthResult<PathBuf> {
    let abs = std::path::absolute(recipe).map_err(|_| BerthError::RecipeNotFound(recipe.to_path_buf()))?;
    if !abs.is_file() {
        return Err(BerthError::RecipeNotFound(recipe.to_path_buf()));
    }
    Ok(abs)
}

/// Fresh empty directory next to `dir`, on the same filesystem
async fn staging_dir(dir: &Path) -> BerthResult<PathBuf> {
    let parent = dir
        .parent()
        .ok_or_else(|| BerthError::Internal(format!("cache dir {} has no parent", dir.display())))?;
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = hex::encode(rand::random::<[u8; 4]>());
    let staging = parent.join(format!(".{}.partial-{}", name, suffix));

    fs::create_dir_all(&staging)
        .await
        .map_err(|e| BerthError::io(format!("Failed to create {}", staging.display()), e))?;
    Ok(staging)
}

async fn reset_dir(dir: &Path) -> BerthResult<()> {
    let _ = fs::remove_dir_all(dir).await;
    fs::create_dir_all(dir)
        .await
        .map_err(|e| BerthError::io(format!("Failed to create {}", dir.display()), e))
}

async fn is_empty_dir(dir: &Path) -> BerthResult<bool> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| BerthError::io(format!("Failed to read {}", dir.display()), e))?;
    let first = entries
        .next_entry()
        .await
        .map_err(|e| BerthError::io(format!("Failed to read {}", dir.display()), e))?;
    Ok(first.is_none())
}
