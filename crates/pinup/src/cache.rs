//! Per-run memoization of resolved references.
//!
//! Neither cache ever evicts: entries live exactly as long as the
//! invocation that created them.

use std::{collections::HashMap, sync::Mutex};

use moka::sync::Cache;

/// A key -> digest memo for resolved references.
pub(crate) trait RefCache: Send + Sync {
    /// Returns the value previously stored under `key`, if any.
    fn load(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn store(&self, key: &str, value: &str);
}

/// A cache that can be shared between concurrently running file tasks.
#[derive(Clone)]
pub(crate) struct SharedCache(Cache<String, String>);

impl SharedCache {
    pub(crate) fn new() -> Self {
        // No `max_capacity`, so nothing is ever evicted.
        Self(Cache::builder().build())
    }
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RefCache for SharedCache {
    fn load(&self, key: &str) -> Option<String> {
        self.0.get(key)
    }

    fn store(&self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }
}

/// A cache for callers that resolve from a single task.
///
/// The lock is never contended in that setting; it exists only so that
/// the cache can sit behind the same trait object as [`SharedCache`].
#[derive(Default)]
pub(crate) struct LocalCache(Mutex<HashMap<String, String>>);

impl LocalCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl RefCache for LocalCache {
    fn load(&self, key: &str) -> Option<String> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn store(&self, key: &str, value: &str) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), value.to_string());
    }
}
