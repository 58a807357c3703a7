//! Durable key to JSON document storage
//!
//! Keys are `/`-separated namespaces such as `state/<installation_id>` or
//! `snapshot/<snapshot_id>`. [`JsonFileStore`] keeps one pretty-printed JSON
//! file per key; [`MemoryStore`] backs tests and dry runs.

use crate::error::{Error, Result};
use fs4::fs_std::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

pub const STATE_NAMESPACE: &str = "state";
pub const PROFILE_NAMESPACE: &str = "profile";
pub const DECISIONS_NAMESPACE: &str = "decisions";
pub const SNAPSHOT_NAMESPACE: &str = "snapshot";

/// Build a namespaced key
pub fn key(namespace: &str, id: &str) -> String {
    format!("{}/{}", namespace, id)
}

/// Key to JSON document storage
pub trait StateStore: Send + Sync {
    /// Read a document; a missing key yields `None`
    fn read(&self, key: &str) -> Result<Option<Value>>;

    /// Create or replace a document
    fn write(&self, key: &str, value: &Value) -> Result<()>;

    /// Delete a document; returns whether it existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`, sorted
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Read and deserialize a typed document
pub fn load_json<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    match store.read(key)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and write a typed document
pub fn save_json<T: Serialize>(store: &dyn StateStore, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)?;
    store.write(key, &value)
}

/// Reject keys that could escape the store root
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && !key.ends_with('/')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-'))
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidKey {
            key: key.to_string(),
        })
    }
}

/// One JSON file per key under a root directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(format!("{}.json", key)))
    }

    /// Exclusive lock guarding writers; released when the file is dropped
    fn lock(&self) -> Result<fs::File> {
        fs::create_dir_all(&self.root)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.root.join(".lock"))?;
        file.lock_exclusive()?;
        Ok(file)
    }
}

impl StateStore for JsonFileStore {
    fn read(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        let _lock = self.lock()?;
        fs::create_dir_all(&parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        serde_json::to_writer_pretty(&mut tmp, value)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::trace!(key, path = %path.display(), "wrote state document");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        let _lock = self.lock()?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if let Some(key) = relative.strip_suffix(".json") {
                if key.starts_with(prefix) && validate_key(key).is_ok() {
                    keys.push(key.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn documents(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        Ok(self.documents().get(key).cloned())
    }

    fn write(&self, key: &str, value: &Value) -> Result<()> {
        validate_key(key)?;
        self.documents().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.documents().remove(key).is_some())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .documents()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[test]
    fn test_file_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp.path());

        store.write("state/inst-1", &json!({"phase": "initializing"})).unwrap();
        let value = store.read("state/inst-1").unwrap().unwrap();
        assert_eq!(value["phase"], "initializing");
        assert!(temp.path().join("state/inst-1.json").exists());
    }

    #[test]
    fn test_file_store_missing_and_delete() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp.path());

        assert!(store.read("profile/none").unwrap().is_none());
        assert!(!store.delete("profile/none").unwrap());

        store.write("profile/a", &json!({})).unwrap();
        assert!(store.delete("profile/a").unwrap());
        assert!(store.read("profile/a").unwrap().is_none());
    }

    #[test]
    fn test_file_store_keys_by_prefix() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp.path());

        store.write("snapshot/b", &json!(1)).unwrap();
        store.write("snapshot/a", &json!(2)).unwrap();
        store.write("state/x", &json!(3)).unwrap();

        assert_eq!(
            store.keys("snapshot/").unwrap(),
            vec!["snapshot/a".to_string(), "snapshot/b".to_string()]
        );
    }

    #[test]
    fn test_invalid_keys_rejected() {
        for key in ["", "/etc/passwd", "state/../x", "state/", "a b", "state//x"] {
            assert!(validate_key(key).is_err(), "{key} should be rejected");
        }
        assert!(validate_key("snapshot/inst-1.snap_2").is_ok());
    }

    #[test]
    fn test_typed_helpers() {
        let store = MemoryStore::new();
        let doc = Doc {
            name: "docbro".into(),
            count: 2,
        };
        save_json(&store, "profile/p1", &doc).unwrap();
        let loaded: Option<Doc> = load_json(&store, "profile/p1").unwrap();
        assert_eq!(loaded, Some(doc));

        let missing: Option<Doc> = load_json(&store, "profile/p2").unwrap();
        assert!(missing.is_none());
    }
}
