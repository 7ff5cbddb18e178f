//! Key-value store trait definition.

use crate::error::StorageResult;

/// A durable key-value store for the local cache.
///
/// Values are **opaque bytes**. The engine decides how collections and the
/// mutation queue are encoded; backends only keep them.
///
/// # Invariants
///
/// - `get` returns exactly the bytes of the last successful `put` for the key
/// - `put` replaces the previous value atomically: a reader never observes a
///   partially written value
/// - `remove` on a missing key is not an error
/// - Backends must be `Send + Sync` so one store can back a shared engine
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key has never been written or was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write cannot be made
    /// durable.
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Deletes the value stored under `key`.
    ///
    /// Returns whether a value was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Lists every stored key in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the key listing cannot be read.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

/// Rejects keys no backend can store.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(crate::error::StorageError::InvalidKey(
            "key must not be empty".into(),
        ));
    }
    Ok(())
}
