//! Cache key derivation
//!
//! A key is `<prefix>/<path>[-<type>]:<fingerprint>`, where the prefix is a
//! registry location derived from the repository identity and the path is
//! the recipe's location relative to the repository root.

use crate::cache::fingerprint::slash_path;
use crate::error::{BerthError, BerthResult};
use git2::Repository;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix used when neither an override nor an origin remote is available
pub const FALLBACK_PREFIX: &str = "localhost/berth-cache";

/// Repository the recipes live in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoIdentity {
    /// Working tree root (the directory holding `.git`)
    pub root: PathBuf,
    /// Normalized repository name, e.g. `github.com/owner/repo`
    pub name: Option<String>,
}

impl RepoIdentity {
    /// Identity with an explicit root and name
    pub fn new(root: impl Into<PathBuf>, name: Option<String>) -> Self {
        Self {
            root: root.into(),
            name,
        }
    }

    /// Find the enclosing git checkout and read its `origin` remote
    pub fn discover(start: &Path) -> BerthResult<Self> {
        let repo = Repository::discover(start).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                BerthError::RepoRootNotFound(start.to_path_buf())
            } else {
                BerthError::Git(e)
            }
        })?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| BerthError::RepoRootNotFound(start.to_path_buf()))?;
        let root = spelled_like(start, workdir);

        let name = match repo.find_remote("origin") {
            Ok(remote) => remote.url().and_then(normalize_remote),
            Err(e) if e.code() == git2::ErrorCode::NotFound => None,
            Err(e) => return Err(BerthError::Git(e)),
        };

        debug!(
            "Repository {} at {}",
            name.as_deref().unwrap_or("<unnamed>"),
            root.display()
        );
        Ok(Self { root, name })
    }

    /// Registry prefix: the override if given, else the repository name,
    /// mapped to its container registry
    pub fn registry_prefix(&self, override_prefix: Option<&str>) -> String {
        if let Some(prefix) = override_prefix.filter(|p| !p.is_empty()) {
            return registry_for(prefix.trim_end_matches('/'));
        }
        match &self.name {
            Some(name) => registry_for(name),
            None => FALLBACK_PREFIX.to_string(),
        }
    }
}

/// The ancestor of `start` that is `workdir`, so recipe paths under `start`
/// strip cleanly even when symlinks make the two spellings differ
fn spelled_like(start: &Path, workdir: &Path) -> PathBuf {
    let canonical = workdir
        .canonicalize()
        .unwrap_or_else(|_| workdir.to_path_buf());
    start
        .ancestors()
        .find(|dir| dir.canonicalize().is_ok_and(|d| d == canonical))
        .map(Path::to_path_buf)
        .unwrap_or(canonical)
}

/// Normalize a git remote URL to `host/owner/repo`
///
/// Accepts scp-like (`git@github.com:o/r.git`) and URL forms
/// (`https://github.com/o/r.git`, `ssh://git@github.com/o/r`).
pub fn normalize_remote(url: &str) -> Option<String> {
    let url = url.trim();
    let rest = if let Some((_, rest)) = url.split_once("://") {
        rest.to_string()
    } else if let Some((host, path)) = url.split_once(':') {
        format!("{}/{}", host, path)
    } else {
        return None;
    };

    // drop credentials and port
    let rest = rest.rsplit_once('@').map(|(_, r)| r).unwrap_or(rest.as_str());
    let (host, path) = rest.split_once('/')?;
    let host = host.split(':').next().unwrap_or(host);
    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    if host.is_empty() || path.is_empty() {
        return None;
    }
    Some(repo_name(&format!("{}/{}", host.to_lowercase(), path)))
}

/// Strip subdirectories from a GitHub path: `github.com/o/r/sub` -> `github.com/o/r`
pub fn repo_name(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() >= 3 && parts[0] == "github.com" {
        return parts[..3].join("/");
    }
    path.to_string()
}

/// Map a repository name to its container registry, `github.com` -> `ghcr.io`
pub fn registry_for(repo: &str) -> String {
    repo.replacen("github.com", "ghcr.io", 1).to_lowercase()
}

/// Image reference for a recipe
///
/// The path component is the recipe's directory relative to `root`, or the
/// recipe file itself when it is not named `Dockerfile`, lower-cased.
pub fn image_cache_name(
    prefix: &str,
    root: &Path,
    abs_recipe: &Path,
    content_type: Option<&str>,
    hash: &str,
) -> BerthResult<String> {
    let target = match abs_recipe.file_name() {
        Some(name) if name == "Dockerfile" => abs_recipe.parent().unwrap_or(abs_recipe),
        _ => abs_recipe,
    };
    let rel = target
        .strip_prefix(root)
        .map_err(|_| BerthError::RepoRootNotFound(abs_recipe.to_path_buf()))?;

    let mut path = slash_path(rel).to_lowercase();
    if path.is_empty() {
        path = "root".to_string();
    }
    if let Some(content_type) = content_type {
        path.push('-');
        path.push_str(content_type);
    }
    Ok(format!("{}/{}:{}", prefix, path, hash))
}
