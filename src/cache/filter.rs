//! Glob filtering of exported directories

use crate::cache::fingerprint::slash_path;
use crate::error::{BerthError, BerthResult};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Set of globs naming the files an export keeps
///
/// Patterns match `/`-separated paths relative to the export root; `*` does
/// not cross directories while `**` does. An empty set keeps everything.
#[derive(Debug, Clone)]
pub struct KeepFilter {
    set: Option<GlobSet>,
}

impl KeepFilter {
    /// Compile `globs`, rejecting malformed patterns up front
    pub fn new(globs: &[String]) -> BerthResult<Self> {
        if globs.is_empty() {
            return Ok(Self { set: None });
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in globs {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| BerthError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| BerthError::InvalidPattern {
            pattern: globs.join(", "),
            reason: e.to_string(),
        })?;
        Ok(Self { set: Some(set) })
    }

    /// Whether a relative slash path is kept
    pub fn keeps(&self, rel: &str) -> bool {
        self.set.as_ref().map_or(true, |set| set.is_match(rel))
    }

    /// Delete every file under `dir` no glob matches, returning how many went
    ///
    /// Directories are left in place. A file that cannot be removed is logged
    /// and skipped.
    pub fn apply(&self, dir: &Path) -> BerthResult<usize> {
        if self.set.is_none() {
            return Ok(0);
        }

        let mut doomed: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry.map_err(|e| {
                BerthError::io(format!("Failed to walk {}", dir.display()), io::Error::other(e))
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let rel = slash_path(entry.path().strip_prefix(dir).unwrap_or(entry.path()));
            if !self.keeps(&rel) {
                doomed.push(entry.into_path());
            }
        }

        let mut removed = 0;
        for path in doomed {
            debug!("Removing file from cache: {}", path.display());
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Unable to remove {} from cache: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn globs(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn keeps_only_matching_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/keep.txt"), "k").unwrap();
        fs::write(dir.path().join("a/drop.log"), "d").unwrap();

        let filter = KeepFilter::new(&globs(&["**/keep.txt"])).unwrap();
        assert_eq!(filter.apply(dir.path()).unwrap(), 1);

        assert!(dir.path().join("a/keep.txt").exists());
        assert!(!dir.path().join("a/drop.log").exists());
    }

    #[test]
    fn double_star_matches_root_level() {
        let filter = KeepFilter::new(&globs(&["**/some*"])).unwrap();
        assert!(filter.keeps("some-file.txt"));
        assert!(filter.keeps("deep/dir/some-thing.txt"));
        assert!(!filter.keeps("other-file.txt"));
    }

    #[test]
    fn single_star_stays_in_directory() {
        let filter = KeepFilter::new(&globs(&["*.txt"])).unwrap();
        assert!(filter.keeps("a.txt"));
        assert!(!filter.keeps("sub/a.txt"));
    }

    #[test]
    fn any_glob_keeps() {
        let filter = KeepFilter::new(&globs(&["bin/*", "lib/**"])).unwrap();
        assert!(filter.keeps("bin/tool"));
        assert!(filter.keeps("lib/x/y.so"));
        assert!(!filter.keeps("share/doc"));
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("x"), "").unwrap();
        let filter = KeepFilter::new(&[]).unwrap();
        assert_eq!(filter.apply(dir.path()).unwrap(), 0);
        assert!(dir.path().join("x").exists());
    }

    #[test]
    fn malformed_glob_is_rejected() {
        let err = KeepFilter::new(&globs(&["a/[b"])).unwrap_err();
        assert!(matches!(err, BerthError::InvalidPattern { .. }));
    }
}
