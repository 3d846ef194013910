//! Persistent key-value storage used for the cached snapshot and the stable id.
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::RwLock,
};

use crate::Result;

/// A synchronous key-value byte store.
///
/// Implementations must be fast enough to be called on the initialization path; they are called
/// while the client is starting up, before the first network round trip completes.
pub trait KeyValueStore: Send + Sync {
    /// Read value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store. Nothing survives process restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .expect("thread holding storage lock should not panic");
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .expect("thread holding storage lock should not panic");
        entries.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .expect("thread holding storage lock should not panic");
        entries.remove(key);
        Ok(())
    }
}

/// File-backed store keeping one file per key inside `dir`.
///
/// The directory is created on first write.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> FileStore {
        FileStore { dir: dir.into() }
    }

    /// Directory holding the stored files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        // Keys are SDK-internal constants, but keep them from escaping the directory anyway.
        let file_name: String = key
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
                _ => '_',
            })
            .collect();
        self.dir.join(file_name)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        // Write to a temporary file first so a crash mid-write never leaves a truncated value.
        let path = self.path(key);
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn memory_store_set_get_remove() {
        let store = MemoryStore::new();

        assert_eq!(store.get("key").unwrap(), None);
        store.set("key", b"value").unwrap();
        assert_eq!(store.get("key").unwrap(), Some(b"value".to_vec()));
        store.remove("key").unwrap();
        assert_eq!(store.get("key").unwrap(), None);
        store.remove("key").unwrap();
    }

    #[test]
    fn file_store_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();

        FileStore::new(temp_dir.path())
            .set("gatekit.stable_id", b"abc")
            .unwrap();

        let store = FileStore::new(temp_dir.path());
        assert_eq!(store.get("gatekit.stable_id").unwrap(), Some(b"abc".to_vec()));

        store.remove("gatekit.stable_id").unwrap();
        assert_eq!(store.get("gatekit.stable_id").unwrap(), None);
    }

    #[test]
    fn file_store_missing_dir_reads_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("not-created"));

        assert_eq!(store.get("anything").unwrap(), None);
        store.remove("anything").unwrap();
    }

    #[test]
    fn file_store_sanitizes_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("store"));

        store.set("../escape", b"x").unwrap();

        assert!(temp_dir.path().join("store").join(".._escape").exists());
        assert!(!temp_dir.path().join("escape").exists());
    }

    #[test]
    fn file_store_creates_dir_on_first_write() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested").join("gatekit");
        let store = FileStore::new(&dir);

        store.set("key", b"value").unwrap();

        assert_eq!(store.dir(), dir.as_path());
        assert_eq!(std::fs::read(dir.join("key")).unwrap(), b"value");
        assert!(!dir.join("key.tmp").exists());
    }
}
