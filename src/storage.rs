//! Key-value persistence
//!
//! The session lives in a small string-to-string store that outlives the
//! process. [`KeyValueStore`] is the port the session layer writes through;
//! [`FileStore`] keeps the map as a JSON document in the user's local data
//! directory, and [`MemoryStore`] is the in-process variant used by tests and
//! short-lived tools.

use crate::error::StorageError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Application directory under the platform data dir
const APP_DIR: &str = "biocaching";

/// Default file name of the persisted store
const STORE_FILE: &str = "session.json";

/// String key-value storage shared by the whole process
///
/// Implementations must tolerate other writers using unrelated keys.
pub trait KeyValueStore {
    /// Value stored under `key`, if any
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`; deleting a missing key is not an error
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;

    /// Delete every key
    fn clear(&mut self) -> Result<(), StorageError>;
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.entries.clear();
        Ok(())
    }
}

/// Store persisted as a flat JSON object on disk
///
/// The whole document is rewritten on every mutation; the store is tiny and
/// writes happen only on login, logout and language changes.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl FileStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = if path.exists() {
            let json = fs::read_to_string(&path)?;
            if json.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str(&json)?
            }
        } else {
            Map::new()
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "opened session store");
        Ok(Self { path, entries })
    }

    /// Open the store at [`FileStore::default_path`]
    pub fn open_default() -> Result<Self, StorageError> {
        Self::open(Self::default_path())
    }

    /// `<local data dir>/biocaching/session.json`, relative to the working
    /// directory when the platform has no data dir
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(STORE_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.entries.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            // Hand-edited files may hold numbers; expose them as text
            other => Some(other.to_string()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .insert(key.to_string(), Value::String(value.to_string()));
        self.save()
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        if self.entries.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.entries.clear();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_lifecycle() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("email"), None);

        store.set("email", "a@b.c").unwrap();
        store.set("language", "nob").unwrap();
        assert_eq!(store.get("email").as_deref(), Some("a@b.c"));

        store.remove("email").unwrap();
        store.remove("email").unwrap();
        assert_eq!(store.get("email"), None);
        assert_eq!(store.len(), 1);

        store.clear().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let mut store = FileStore::open(&path).unwrap();
        store.set("token", "abc").unwrap();
        store.set("userId", "17").unwrap();
        store.remove("userId").unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("token").as_deref(), Some("abc"));
        assert_eq!(reopened.get("userId"), None);
    }

    #[test]
    fn test_file_store_reads_numbers_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{"userId": 17, "picture": null}"#).unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("userId").as_deref(), Some("17"));
        assert_eq!(store.get("picture"), None);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(FileStore::open(&path), Err(StorageError::Json(_))));
    }

    #[test]
    fn test_default_path_ends_with_store_file() {
        let path = FileStore::default_path();
        assert!(path.ends_with("biocaching/session.json"));
    }
}
