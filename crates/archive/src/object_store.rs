//! `ObjectStore` — the storage abstraction archived blobs are written
//! through. No example in the corpus depends on a concrete object-storage
//! SDK (S3, GCS, ...), so the default implementation is a filesystem-backed
//! store keyed the same way a bucket would be (`archive/executions/{date}/{id}.gz`
//! becomes a relative path under `root`); swapping in a real bucket client
//! later only means implementing this trait.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::ArchiveError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ArchiveError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, ArchiveError>;
    async fn delete(&self, key: &str) -> Result<(), ArchiveError>;
}

pub struct FilesystemObjectStore {
    root: std::path::PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> std::path::PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ArchiveError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ArchiveError::Storage(e.to_string()))?;
        }
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| ArchiveError::Storage(e.to_string()))?;
        file.write_all(&bytes).await.map_err(|e| ArchiveError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ArchiveError> {
        let path = self.path_for(key);
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| ArchiveError::Storage(e.to_string()))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).await.map_err(|e| ArchiveError::Storage(e.to_string()))?;
        Ok(bytes)
    }

    async fn delete(&self, key: &str) -> Result<(), ArchiveError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ArchiveError::Storage(e.to_string())),
        }
    }
}
