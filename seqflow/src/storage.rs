//! Object-store existence checks.
//!
//! The decision engine only ever asks one question of storage: does this
//! path exist. Results are cached for the lifetime of a run, since workflow
//! construction completes before any job runs and a path's existence is not
//! expected to change mid-resolution. The same expected-output path is
//! typically queried twice (once while deciding, once while synthesizing a
//! reuse output), so the cache also avoids redundant round-trips.

use crate::errors::WorkflowError;
#[cfg(test)]
use mockall::automock;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Synchronous existence predicate over an object store.
///
/// Implementations must not retry internally on transient failures; the
/// orchestrator treats any error as fatal to the run.
#[cfg_attr(test, automock)]
pub trait ObjectStore: Send + Sync {
    /// Returns whether `path` exists.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the check itself fails.
    fn exists(&self, path: &str) -> Result<bool, std::io::Error>;
}

/// Run-scoped memoization of [`ObjectStore::exists`] results.
pub struct ExistenceCache {
    store: Arc<dyn ObjectStore>,
    cache: RwLock<HashMap<String, bool>>,
}

impl ExistenceCache {
    /// Wraps a store with an empty cache.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns whether `path` exists, consulting the store at most once per
    /// path for the lifetime of this cache.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Storage`] when the underlying check fails;
    /// failures are not cached.
    pub fn exists(&self, path: &str) -> Result<bool, WorkflowError> {
        if let Some(&known) = self.cache.read().get(path) {
            return Ok(known);
        }
        let result = self
            .store
            .exists(path)
            .map_err(|source| WorkflowError::Storage {
                path: path.to_string(),
                source,
            })?;
        tracing::debug!(path, exists = result, "checked object store");
        self.cache.write().insert(path.to_string(), result);
        Ok(result)
    }

    /// Number of distinct paths checked so far.
    #[must_use]
    pub fn checked_count(&self) -> usize {
        self.cache.read().len()
    }
}

/// Existence checks against the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStore;

impl ObjectStore for LocalStore {
    fn exists(&self, path: &str) -> Result<bool, std::io::Error> {
        match std::fs::metadata(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
