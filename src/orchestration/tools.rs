//! External tool lookup
//!
//! Resolved tool paths are memoized in a caller-owned [`ToolLocator`]; the
//! map is mutex-guarded so concurrent lookups of the same tool are safe.

use crate::error::{BerthError, BerthResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Resolves and remembers the location of external CLI tools
#[derive(Debug, Default)]
pub struct ToolLocator {
    resolved: Mutex<HashMap<String, PathBuf>>,
}

impl ToolLocator {
    /// Create an empty locator
    pub fn new() -> Self {
        Self::default()
    }

    /// Locate `name`, preferring an explicitly configured path over `PATH`
    pub fn locate(&self, name: &str, configured: Option<&Path>) -> BerthResult<PathBuf> {
        let mut resolved = self
            .resolved
            .lock()
            .map_err(|_| BerthError::Internal("tool locator lock poisoned".to_string()))?;

        if let Some(path) = resolved.get(name) {
            return Ok(path.clone());
        }

        let path = match configured {
            Some(path) if path.is_file() => path.to_path_buf(),
            Some(path) => {
                return Err(BerthError::CliNotFound {
                    name: name.to_string(),
                    hint: format!("configured path {} does not exist", path.display()),
                })
            }
            None => which::which(name).map_err(|_| BerthError::CliNotFound {
                name: name.to_string(),
                hint: format!("{} was not found in PATH", name),
            })?,
        };

        debug!("Resolved {} to {}", name, path.display());
        resolved.insert(name.to_string(), path.clone());
        Ok(path)
    }
}
