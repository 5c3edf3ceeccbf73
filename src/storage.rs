//! Configuration store backends
//!
//! Persisted documents are addressed by name (e.g. `outputs.json`). Two
//! backends are provided:
//!
//! - [`FileConfigStore`]: one JSON file per document inside a directory
//! - [`SledConfigStore`]: one key per document inside an embedded sled database
//!
//! Both backends replace a document atomically: a reader either sees the
//! previous complete document or the new complete document.

use crate::error::{AccessoryError, EntityKind, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, trace};

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Sled,
}

/// Named-document store used by the persistence codecs
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Whether a document with this name exists
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Load a document, `NotFound` if it does not exist
    async fn load(&self, name: &str) -> Result<String>;

    /// Replace (or create) a document
    async fn store(&self, name: &str, contents: &str) -> Result<()>;

    /// Delete a document, returns whether it existed
    async fn remove(&self, name: &str) -> Result<bool>;
}

fn document_not_found(name: &str) -> AccessoryError {
    AccessoryError::NotFound {
        kind: EntityKind::Document,
        id: name.to_string(),
    }
}

/// Open the backend named by the configuration
pub fn open_store(backend: StorageBackend, path: impl AsRef<Path>) -> Result<Arc<dyn ConfigStore>> {
    let path = path.as_ref();
    match backend {
        StorageBackend::File => Ok(Arc::new(FileConfigStore::new(path))),
        StorageBackend::Sled => Ok(Arc::new(SledConfigStore::open(path.join("sled"))?)),
    }
}

/// Stores each document as a file in a directory
pub struct FileConfigStore {
    root: PathBuf,
}

impl FileConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(fs::try_exists(self.path_for(name)).await?)
    }

    async fn load(&self, name: &str) -> Result<String> {
        match fs::read_to_string(self.path_for(name)).await {
            Ok(contents) => {
                trace!("Loaded {} ({} bytes)", name, contents.len());
                Ok(contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(document_not_found(name)),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, name: &str, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.root).await?;

        // Write next to the target then rename so an interrupted write never
        // leaves a truncated document behind
        let target = self.path_for(name);
        let temp = self.path_for(&format!("{}.tmp", name));
        fs::write(&temp, contents).await?;
        fs::rename(&temp, &target).await?;

        debug!("Stored {} ({} bytes)", target.display(), contents.len());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Stores each document under its name in a sled database
#[derive(Clone)]
pub struct SledConfigStore {
    db: sled::Db,
}

impl SledConfigStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        info!("Config store opened database at: {}", path.display());
        Ok(Self { db })
    }

    pub fn from_db(db: sled::Db) -> Self {
        Self { db }
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AccessoryError::Persistence(format!("storage task failed: {}", e)))?
}

#[async_trait]
impl ConfigStore for SledConfigStore {
    async fn exists(&self, name: &str) -> Result<bool> {
        let db = self.db.clone();
        let key = name.to_string();
        blocking(move || Ok(db.contains_key(key.as_bytes())?)).await
    }

    async fn load(&self, name: &str) -> Result<String> {
        let db = self.db.clone();
        let key = name.to_string();
        let data = blocking(move || Ok(db.get(key.as_bytes())?)).await?;

        match data {
            Some(bytes) => String::from_utf8(bytes.to_vec()).map_err(|e| {
                AccessoryError::Persistence(format!("{} is not valid UTF-8: {}", name, e))
            }),
            None => Err(document_not_found(name)),
        }
    }

    async fn store(&self, name: &str, contents: &str) -> Result<()> {
        let db = self.db.clone();
        let key = name.to_string();
        let value = contents.as_bytes().to_vec();

        blocking(move || {
            db.insert(key.as_bytes(), value)?;
            db.flush()?;
            Ok(())
        })
        .await?;

        debug!("Stored {} in sled ({} bytes)", name, contents.len());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<bool> {
        let db = self.db.clone();
        let key = name.to_string();
        blocking(move || {
            let existed = db.remove(key.as_bytes())?.is_some();
            db.flush()?;
            Ok(existed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let temp = tempdir().unwrap();
        let store = FileConfigStore::new(temp.path().join("data"));

        assert!(!store.exists("outputs.json").await.unwrap());
        store.store("outputs.json", "{\"count\":0}").await.unwrap();
        assert!(store.exists("outputs.json").await.unwrap());
        assert_eq!(store.load("outputs.json").await.unwrap(), "{\"count\":0}");

        // No temporary file left behind
        assert!(!store.exists("outputs.json.tmp").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_missing_document() {
        let temp = tempdir().unwrap();
        let store = FileConfigStore::new(temp.path());

        let err = store.load("missing.json").await.unwrap_err();
        assert!(matches!(err, AccessoryError::NotFound { kind: EntityKind::Document, .. }));
        assert!(!store.remove("missing.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_sled_store_round_trip() {
        let temp = tempdir().unwrap();
        let store = SledConfigStore::open(temp.path().join("test.sled")).unwrap();

        store.store("outputs.json", "[]").await.unwrap();
        assert!(store.exists("outputs.json").await.unwrap());
        assert_eq!(store.load("outputs.json").await.unwrap(), "[]");

        assert!(store.remove("outputs.json").await.unwrap());
        assert!(!store.exists("outputs.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_store_by_backend() {
        let temp = tempdir().unwrap();
        let store = open_store(StorageBackend::Sled, temp.path()).unwrap();
        store.store("a", "b").await.unwrap();
        assert_eq!(store.load("a").await.unwrap(), "b");
    }
}
