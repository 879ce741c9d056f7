use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io")]
    Io,
    #[error("codec")]
    Codec,
    #[error("invalid namespace")]
    Invalid,
}

#[derive(Serialize, Deserialize, Default)]
struct Stored {
    entries: HashMap<String, Vec<u8>>,
}

/// Namespaced durable key-value store, persisted as one JSON file per
/// namespace. Every `put`/`delete` rewrites the file, so a returned `Ok`
/// means the write is durable.
pub struct FileStore {
    path: PathBuf,
    data: Stored,
    namespace: String,
}

/// Outcome of a conditional insert.
pub enum PutIfAbsent {
    Inserted,
    /// The key was already present; carries the stored value re-read under
    /// the same critical section, so racing initializers converge on one
    /// winner without a caller-side lock.
    Conflict(Vec<u8>),
}

impl FileStore {
    pub fn open_or_create(path: impl AsRef<Path>, namespace: &str) -> Result<Self, StorageError> {
        if namespace.trim().is_empty() {
            return Err(StorageError::Invalid);
        }
        let mut base = path.as_ref().to_path_buf();
        fs::create_dir_all(&base).map_err(|_| StorageError::Io)?;
        base.push(format!("{}-store.json", namespace));
        let data = if base.exists() {
            let content = fs::read_to_string(&base).map_err(|_| StorageError::Io)?;
            serde_json::from_str(&content).map_err(|_| StorageError::Codec)?
        } else {
            Stored::default()
        };
        Ok(Self {
            path: base,
            data,
            namespace: namespace.to_string(),
        })
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.data.entries.get(key).cloned()
    }

    pub fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.data.entries.insert(key.to_string(), value);
        self.persist()
    }

    /// Insert only if the key is absent. On conflict the existing value is
    /// returned instead of overwriting it.
    pub fn put_if_absent(&mut self, key: &str, value: Vec<u8>) -> Result<PutIfAbsent, StorageError> {
        if let Some(existing) = self.data.entries.get(key) {
            return Ok(PutIfAbsent::Conflict(existing.clone()));
        }
        self.data.entries.insert(key.to_string(), value);
        self.persist()?;
        Ok(PutIfAbsent::Inserted)
    }

    pub fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        if self.data.entries.remove(key).is_none() {
            return Ok(());
        }
        self.persist()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn persist(&self) -> Result<(), StorageError> {
        let serialized =
            serde_json::to_string_pretty(&self.data).map_err(|_| StorageError::Codec)?;
        fs::write(&self.path, serialized).map_err(|_| StorageError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopen_sees_persisted_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut store = FileStore::open_or_create(dir.path(), "chat").expect("open");
            store.put("room:1", b"alpha".to_vec()).expect("put");
        }
        let store = FileStore::open_or_create(dir.path(), "chat").expect("reopen");
        assert_eq!(store.get("room:1"), Some(b"alpha".to_vec()));
        assert_eq!(store.namespace(), "chat");
    }

    #[test]
    fn put_if_absent_keeps_first_writer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = FileStore::open_or_create(dir.path(), "chat").expect("open");
        match store.put_if_absent("cursor:a", b"1".to_vec()).expect("first") {
            PutIfAbsent::Inserted => {}
            PutIfAbsent::Conflict(_) => panic!("first insert must win"),
        }
        match store.put_if_absent("cursor:a", b"2".to_vec()).expect("second") {
            PutIfAbsent::Conflict(existing) => assert_eq!(existing, b"1".to_vec()),
            PutIfAbsent::Inserted => panic!("second insert must conflict"),
        }
    }

    #[test]
    fn delete_missing_key_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = FileStore::open_or_create(dir.path(), "chat").expect("open");
        store.delete("absent").expect("noop delete");
        assert!(store.get("absent").is_none());
    }

    #[test]
    fn empty_namespace_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            FileStore::open_or_create(dir.path(), "  "),
            Err(StorageError::Invalid)
        ));
    }
}
