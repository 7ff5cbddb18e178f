//! JSON persistence of engine state on top of a key-value store.

use mirrorsync_storage::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Loads and saves JSON values under string keys.
///
/// Every failure is absorbed: a load falls back to the caller's default and
/// a save is logged and dropped. The in-memory state stays authoritative for
/// the running process.
#[derive(Clone)]
pub struct PersistenceAdapter {
    store: Arc<dyn KeyValueStore>,
}

impl PersistenceAdapter {
    /// Wraps a key-value store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Loads the value under `key`, or `fallback` if it is missing or
    /// cannot be decoded.
    pub fn load<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        let bytes = match self.store.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key, "No persisted state");
                return fallback;
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to read persisted state");
                return fallback;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Discarding corrupt persisted state");
                fallback
            }
        }
    }

    /// Saves `value` under `key`. `None` removes the key.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: Option<&T>) {
        let result = match value {
            None => self.store.remove(key).map(|_| ()),
            Some(value) => match serde_json::to_vec(value) {
                Ok(bytes) => self.store.put(key, &bytes),
                Err(e) => {
                    warn!(key, error = %e, "Failed to encode state for persistence");
                    return;
                }
            },
        };

        if let Err(e) = result {
            warn!(key, error = %e, "Failed to persist state");
        }
    }
}

impl std::fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceAdapter").finish_non_exhaustive()
    }
}
