//! Generic key-value persistence.
//!
//! Every persisted record lives under its own namespaced key. The file
//! backend writes each key to its own file using the temp-file + rename
//! pattern so a crash mid-write never leaves a half-written record.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    fn io(key: &str, source: io::Error) -> Self {
        Self::Io {
            key: key.to_string(),
            source,
        }
    }
}

/// Byte-oriented key-value store.
///
/// `remove` must succeed when the key does not exist.
pub trait KvStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the value stored under `key`.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Delete `key`.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if `key` currently holds a value.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Directory-backed store, one file per key.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir.to_string_lossy(), e))?;
        debug!("Key-value store at {:?}", dir);
        Ok(Self { dir })
    }

    /// Root directory of the store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys contain ':' which is not portable in file names
        self.dir.join(format!("{}.kv", URL_SAFE_NO_PAD.encode(key)))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(key, e)),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let temp_path = path.with_extension("tmp");

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&temp_path)
            .map_err(|e| StoreError::io(key, e))?;
        file.write_all(value).map_err(|e| StoreError::io(key, e))?;
        file.sync_all().map_err(|e| StoreError::io(key, e))?;
        drop(file);

        fs::rename(&temp_path, &path).map_err(|e| StoreError::io(key, e))?;
        debug!("Wrote {} bytes to '{}'", value.len(), key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(key, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let kv = MemoryKvStore::new();
        assert_eq!(kv.get("a").unwrap(), None);

        kv.set("a", b"1").unwrap();
        assert!(kv.contains("a"));
        assert_eq!(kv.get("a").unwrap(), Some(b"1".to_vec()));

        kv.remove("a").unwrap();
        kv.remove("a").unwrap();
        assert!(!kv.contains("a"));
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let kv = FileKvStore::open(dir.path()).unwrap();
        kv.set("shallot:tabs", b"payload").unwrap();

        let reopened = FileKvStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("shallot:tabs").unwrap(), Some(b"payload".to_vec()));
    }

    #[test]
    fn test_file_store_overwrite_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKvStore::open(dir.path()).unwrap();

        kv.set("k", b"first").unwrap();
        kv.set("k", b"second").unwrap();
        assert_eq!(kv.get("k").unwrap(), Some(b"second".to_vec()));

        kv.remove("k").unwrap();
        assert_eq!(kv.get("k").unwrap(), None);

        // Removing a missing key is not an error
        kv.remove("k").unwrap();
    }

    #[test]
    fn test_file_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKvStore::open(dir.path()).unwrap();
        kv.set("shallot:settings", b"{}").unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".kv"));
    }
}
