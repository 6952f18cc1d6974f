//! Durable key-value backends for the offline cache.

use crate::error::KvError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

pub const MAX_KEY_LENGTH: usize = 512;

/// String-valued durable storage.
///
/// Implementations must make `put` atomic: after a crash a reader sees either
/// the previous value or the new one, never a torn write.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn put(&self, key: &str, value: String) -> Result<(), KvError>;
    async fn remove(&self, key: &str) -> Result<(), KvError>;
}

fn validate_key(key: &str) -> Result<(), KvError> {
    if key.trim().is_empty() {
        return Err(KvError::InvalidKey {
            key: key.to_string(),
            reason: "key cannot be empty",
        });
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(KvError::InvalidKey {
            key: key.chars().take(50).collect::<String>() + "...",
            reason: "key exceeds maximum length",
        });
    }
    if key.contains('\0') {
        return Err(KvError::InvalidKey {
            key: key.replace('\0', "\\0"),
            reason: "key cannot contain null bytes",
        });
    }
    Ok(())
}

/// In-process storage. Counts writes so callers can observe I/O volume.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        validate_key(key)?;
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), KvError> {
        validate_key(key)?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), KvError> {
        validate_key(key)?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory.
///
/// Writes go to a temporary sibling first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileKv {
    root: PathBuf,
}

impl FileKv {
    /// Use `root` as the storage directory, creating it if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, KvError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", encode_file_name(key)))
    }
}

/// Keep `[A-Za-z0-9_-]`, percent-encode every other byte.
fn encode_file_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

#[async_trait]
impl KeyValueStore for FileKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        validate_key(key)?;
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: String) -> Result<(), KvError> {
        validate_key(key)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), KvError> {
        validate_key(key)?;
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_put_get_remove() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("a").await.unwrap(), None);

        kv.put("a", "1".into()).await.unwrap();
        kv.put("a", "2".into()).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(kv.write_count(), 2);

        kv.remove("a").await.unwrap();
        assert!(!kv.contains("a"));
    }

    #[tokio::test]
    async fn invalid_keys_rejected() {
        let kv = MemoryKv::new();
        assert!(matches!(
            kv.put("   ", "x".into()).await,
            Err(KvError::InvalidKey { .. })
        ));
        assert!(matches!(
            kv.get("a\0b").await,
            Err(KvError::InvalidKey { .. })
        ));
        let long = "k".repeat(MAX_KEY_LENGTH + 1);
        assert!(kv.get(&long).await.is_err());
    }

    #[test]
    fn file_names_are_safe() {
        assert_eq!(encode_file_name("favorites:user-1"), "favorites%3Auser-1");
        assert_eq!(encode_file_name("../etc"), "%2E%2E%2Fetc");
    }

    #[tokio::test]
    async fn file_kv_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path()).await.unwrap();
        kv.put("favorites:u1", r#"{"x":1}"#.into()).await.unwrap();

        let reopened = FileKv::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.get("favorites:u1").await.unwrap().as_deref(),
            Some(r#"{"x":1}"#)
        );
        assert_eq!(reopened.get("favorites:u2").await.unwrap(), None);

        reopened.remove("favorites:u1").await.unwrap();
        reopened.remove("favorites:u1").await.unwrap();
        assert_eq!(kv.get("favorites:u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_kv_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path().join("cache")).await.unwrap();
        kv.put("k", "v".into()).await.unwrap();

        let mut entries = std::fs::read_dir(kv.root()).unwrap();
        let name = entries.next().unwrap().unwrap().file_name();
        assert_eq!(name, "k.json");
        assert!(entries.next().is_none());
    }
}
