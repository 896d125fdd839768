//! Blob storage for uploaded files.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// An object store addressed by relative slash-separated paths.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write (or overwrite) an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is unsafe or the write fails.
    async fn put(&self, path: &str, data: Bytes) -> Result<()>;

    /// Read an object, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is unsafe or the read fails.
    async fn get(&self, path: &str) -> Result<Option<Bytes>>;

    /// Delete an object. Deleting a missing object is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is unsafe or the delete fails.
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Local filesystem [`BlobStore`].
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Resolve a key below the root, rejecting anything that could escape it.
    fn key_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.starts_with('\\') {
            return Err(StoreError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        for component in Path::new(key).components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StoreError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }

        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a unique temp file, fsync, then rename into place.
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!("{file_name}.tmp.{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &path).await?;

        tracing::debug!(key, size = data.len(), "Stored blob");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.key_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store() -> (FsBlobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn put_get_delete() {
        let (store, dir) = create_test_store().await;

        store
            .put("avatars/abc-me.png", Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert!(dir.path().join("avatars/abc-me.png").exists());

        let data = store.get("avatars/abc-me.png").await.unwrap().unwrap();
        assert_eq!(&data[..], b"png");

        store.delete("avatars/abc-me.png").await.unwrap();
        assert!(store.get("avatars/abc-me.png").await.unwrap().is_none());
        store.delete("avatars/abc-me.png").await.unwrap();
    }

    #[tokio::test]
    async fn overwrite_replaces_content() {
        let (store, _dir) = create_test_store().await;
        store.put("a.txt", Bytes::from_static(b"one")).await.unwrap();
        store.put("a.txt", Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(&store.get("a.txt").await.unwrap().unwrap()[..], b"two");
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let (store, _dir) = create_test_store().await;
        for key in ["../escape", "/etc/passwd", "a/../../b", "./a", ""] {
            let err = store.put(key, Bytes::new()).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey(_)), "{key:?}");
        }
    }
}
