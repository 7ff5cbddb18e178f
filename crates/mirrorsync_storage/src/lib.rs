//! # mirrorsync Storage
//!
//! Durable key-value backends for the mirrorsync local cache.
//!
//! Backends are **opaque byte stores**: they map string keys to byte
//! values and know nothing about entity records or the mutation queue.
//! The engine owns all encoding.
//!
//! ## Design Principles
//!
//! - One value per key, replaced wholesale on every write
//! - A completed `put` survives process restarts (for durable backends)
//! - Must be `Send + Sync`; backends use interior locking
//!
//! ## Available Backends
//!
//! - [`InMemoryStore`] - For testing and ephemeral sessions
//! - [`FileStore`] - One file per key inside a locked directory
//!
//! ## Example
//!
//! ```rust
//! use mirrorsync_storage::{InMemoryStore, KeyValueStore};
//!
//! let store = InMemoryStore::new();
//! store.put("app:v1:assets", b"[]").unwrap();
//! assert_eq!(store.get("app:v1:assets").unwrap(), Some(b"[]".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::KeyValueStore;
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
