//! Content fingerprints for cache keys

use crate::error::{BerthError, BerthResult};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the directories excluded from fingerprints (they hold cache output)
pub const CACHE_DIR_NAME: &str = ".cache";

/// Hashes a set of paths into a stable hex digest
pub trait Fingerprinter: Send + Sync {
    /// Digest of every regular file under `paths`
    ///
    /// Identical content yields the same digest; any changed byte, added or
    /// removed file, or renamed file changes it.
    fn fingerprint(&self, paths: &[PathBuf]) -> BerthResult<String>;
}

/// SHA-256 over sorted relative paths and file contents
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Fingerprinter;

impl Fingerprinter for Sha256Fingerprinter {
    fn fingerprint(&self, paths: &[PathBuf]) -> BerthResult<String> {
        let mut entries = Vec::new();
        for (index, root) in paths.iter().enumerate() {
            collect_files(index, root, &mut entries)?;
        }
        entries.sort();

        let mut hasher = Sha256::new();
        for (key, path) in &entries {
            hasher.update(key.as_bytes());
            hasher.update([0]);
            hasher.update(file_digest(path)?.as_bytes());
            hasher.update(b"\n");
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Gather `(key, path)` pairs for every regular file under `root`
fn collect_files(index: usize, root: &Path, out: &mut Vec<(String, PathBuf)>) -> BerthResult<()> {
    if root.is_file() {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.push((format!("{}:{}", index, name), root.to_path_buf()));
        return Ok(());
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == CACHE_DIR_NAME));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let context = format!("Failed to walk {}", root.display());
            BerthError::io(context, io::Error::other(e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = slash_path(entry.path().strip_prefix(root).unwrap_or(entry.path()));
        out.push((format!("{}:{}", index, rel), entry.into_path()));
    }
    Ok(())
}

/// Render a relative path with `/` separators
pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// SHA-256 of a single file's contents, hex encoded
pub fn file_digest(path: &Path) -> BerthResult<String> {
    let mut file = File::open(path)
        .map_err(|e| BerthError::io(format!("Failed to open {}", path.display()), e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| BerthError::io(format!("Failed to read {}", path.display()), e))?;
    Ok(hex::encode(hasher.finalize()))
}
