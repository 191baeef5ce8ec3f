//! Placement of exported cache directories on disk

use crate::cache::fingerprint::CACHE_DIR_NAME;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Directory names that mark a shared fixture tree
const FIXTURE_DIRS: [&str; 2] = ["testdata", "test-fixtures"];

/// Directory an export of `abs_recipe` with fingerprint `hash` lives in
///
/// Recipes under a `testdata` or `test-fixtures` directory share one cache
/// root next to it, `<fixtures>/.cache/<hash>/<sub-path>`, where the sub-path
/// is the recipe's location below the fixture directory (including the file
/// name when it is not `Dockerfile`). Anything else caches beside itself in
/// `<recipe dir>/.cache/<hash>`. A configured `cache_root` replaces the
/// `.cache` directory in both cases.
pub fn find_cache_dir(abs_recipe: &Path, hash: &str, cache_root: Option<&Path>) -> PathBuf {
    let parent = abs_recipe.parent().unwrap_or(Path::new("/"));
    let components: Vec<Component<'_>> = parent.components().collect();

    for marker in FIXTURE_DIRS {
        let Some(idx) = components
            .iter()
            .position(|c| c.as_os_str() == OsStr::new(marker))
        else {
            continue;
        };

        let fixtures: PathBuf = components[..=idx].iter().collect();
        let mut sub_path: PathBuf = components[idx + 1..].iter().collect();
        if let Some(name) = abs_recipe.file_name().filter(|n| *n != "Dockerfile") {
            sub_path.push(name);
        }

        let root = cache_root
            .map(Path::to_path_buf)
            .unwrap_or_else(|| fixtures.join(CACHE_DIR_NAME));
        return root.join(hash).join(sub_path);
    }

    match cache_root {
        Some(root) => root.join(hash),
        None => parent.join(CACHE_DIR_NAME).join(hash),
    }
}
