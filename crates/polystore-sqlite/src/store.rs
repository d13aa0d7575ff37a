//! Asynchronous snapshot stores.
//!
//! A snapshot store is a named key-value collection holding the serialized
//! database of a [`crate::BlobAdapter`] under the single fixed key
//! [`SNAPSHOT_KEY`]. Writes must be atomic: a reader observes either the
//! previous blob or the new one, never a torn mix. Browser hosts back this
//! with their key-value database; the implementations here cover in-process
//! hosts and tests.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use polystore_common::{Result, StorageError};

/// Key under which the database blob lives in its collection.
pub const SNAPSHOT_KEY: &str = "db";

/// Layout version of the snapshot collection.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A named collection holding one database blob.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Opens (or creates) the backing collection.
    async fn open(&self) -> Result<()>;

    /// Reads the blob, `None` when absent.
    async fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Atomically replaces the blob.
    async fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Removes the blob.
    async fn clear(&self) -> Result<()>;

    /// Releases the backing handle.
    async fn close(&self) -> Result<()>;

    /// Human-readable location for diagnostics.
    fn descriptor(&self) -> String;
}

/// Blobs held by [`MemorySnapshotStore`] instances, keyed by
/// `(db_name, store_name)` so a close/reopen against the same names
/// observes the last committed blob, the way a browser database would.
static MEMORY_BLOBS: Lazy<Mutex<HashMap<(String, String), Vec<u8>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Process-local snapshot store emulating a browser key-value database.
#[derive(Debug, Clone)]
pub struct MemorySnapshotStore {
    db_name: String,
    store_name: String,
}

impl MemorySnapshotStore {
    pub fn new(db_name: impl Into<String>, store_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            store_name: store_name.into(),
        }
    }

    fn key(&self) -> (String, String) {
        (self.db_name.clone(), self.store_name.clone())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn read(&self) -> Result<Option<Vec<u8>>> {
        Ok(MEMORY_BLOBS.lock().get(&self.key()).cloned())
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        MEMORY_BLOBS.lock().insert(self.key(), bytes.to_vec());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        MEMORY_BLOBS.lock().remove(&self.key());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn descriptor(&self) -> String {
        format!("memory://{}/{}", self.db_name, self.store_name)
    }
}

/// File-backed snapshot store: `<root>/<db_name>/<store_name>.blob`,
/// written via temp file and atomic rename.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
    db_name: String,
    store_name: String,
}

impl FileSnapshotStore {
    pub fn new(
        root: impl Into<PathBuf>,
        db_name: impl Into<String>,
        store_name: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            db_name: db_name.into(),
            store_name: store_name.into(),
        }
    }

    fn blob_path(&self) -> PathBuf {
        self.root
            .join(&self.db_name)
            .join(format!("{}.blob", self.store_name))
    }

    fn io_err(context: &str, err: std::io::Error) -> StorageError {
        StorageError::Connection(format!("snapshot store {context}: {err}"))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn open(&self) -> Result<()> {
        let dir = self.root.join(&self.db_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Self::io_err("create", e))?;
        Ok(())
    }

    async fn read(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.blob_path()).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_err("read", e)),
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        let path = self.blob_path();
        let tmp = path.with_extension("blob.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| Self::io_err("write", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Self::io_err("rename", e))?;
        debug!(path = %path.display(), bytes = bytes.len(), "blob written");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(self.blob_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err("clear", e)),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn descriptor(&self) -> String {
        self.blob_path().display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemorySnapshotStore::new("db-a", "snapshots");
        store.open().await.unwrap();
        assert_eq!(store.read().await.unwrap(), None);

        store.write(b"one").await.unwrap();
        assert_eq!(store.read().await.unwrap().unwrap(), b"one");

        // A second handle against the same names sees the blob.
        let other = MemorySnapshotStore::new("db-a", "snapshots");
        assert_eq!(other.read().await.unwrap().unwrap(), b"one");

        store.clear().await.unwrap();
        assert_eq!(store.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_isolated_by_name() {
        let a = MemorySnapshotStore::new("iso-a", "s");
        let b = MemorySnapshotStore::new("iso-b", "s");
        a.write(b"blob-a").await.unwrap();
        assert_eq!(b.read().await.unwrap(), None);
        a.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path(), "app", "kv");
        store.open().await.unwrap();
        assert_eq!(store.read().await.unwrap(), None);

        store.write(b"payload").await.unwrap();
        assert_eq!(store.read().await.unwrap().unwrap(), b"payload");

        store.write(b"replaced").await.unwrap();
        assert_eq!(store.read().await.unwrap().unwrap(), b"replaced");

        store.clear().await.unwrap();
        assert_eq!(store.read().await.unwrap(), None);
    }
}
