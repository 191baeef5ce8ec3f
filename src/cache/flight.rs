//! Per-key serialization of cache fills

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async locks keyed by cache reference
///
/// Concurrent requests for the same key run one at a time, so the second
/// caller finds the entry the first one produced instead of building again.
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // entries nobody holds or waits on can go
            locks.retain(|k, l| k == key || Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no key is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
