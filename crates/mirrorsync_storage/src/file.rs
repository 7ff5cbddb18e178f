//! File-based key-value store for persistent storage.
//!
//! Layout of a store directory:
//!
//! ```text
//! <dir>/
//! ├─ LOCK                      # Advisory lock for single-writer
//! ├─ app%3Av1%3Aassets.kv      # One file per key (escaped name)
//! └─ app%3Av1%3Amutations.kv
//! ```

use crate::backend::{validate_key, KeyValueStore};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const VALUE_EXT: &str = ".kv";
const TEMP_EXT: &str = ".tmp";

/// A file-based key-value store.
///
/// Every key lives in its own file, so a write only ever touches one value.
/// Data survives process restarts.
///
/// # Durability
///
/// `put` writes to a temporary file, calls `File::sync_all()`, then renames
/// it over the previous value. A crash leaves either the old or the new
/// value, never a torn one.
///
/// # Thread Safety
///
/// The directory is held with an exclusive advisory lock for the lifetime
/// of the store. Writes within the process are serialized.
///
/// # Example
///
/// ```no_run
/// use mirrorsync_storage::{FileStore, KeyValueStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("cache")).unwrap();
/// store.put("app:v1:assets", b"[]").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store in the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - Another process holds the lock (returns `Locked`)
    /// - I/O errors occur
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(dir.display().to_string()));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", escape_key(key), VALUE_EXT))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        match fs::read(self.value_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock();

        let path = self.value_path(key);
        let mut temp_name = path.clone().into_os_string();
        temp_name.push(TEMP_EXT);
        let temp_path = PathBuf::from(temp_name);

        {
            let mut file = File::create(&temp_path)?;
            file.write_all(value)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let _guard = self.write_lock.lock();

        match fs::remove_file(self.value_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(escaped) = name.strip_suffix(VALUE_EXT) {
                keys.push(unescape_key(escaped)?);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn is_plain(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.')
}

/// Maps a key to a file-system-safe name using `%XX` escapes.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for &byte in key.as_bytes() {
        if is_plain(byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn unescape_key(name: &str) -> StorageResult<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name
                .get(i + 1..i + 3)
                .ok_or_else(|| StorageError::Corrupted(format!("truncated escape in {name}")))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| StorageError::Corrupted(format!("bad escape in {name}")))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| StorageError::Corrupted(format!("non-UTF-8 key {name}")))
}
