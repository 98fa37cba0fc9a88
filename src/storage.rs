use async_trait::async_trait;
use log::{error, info};
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

use crate::media::{is_plain_file_name, MediaFolder, MediaPath};

#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("not_found")]
    NotFound,
    #[error("io: {0}")]
    Io(String),
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Writes `bytes` as `folder/file_name` and returns its public URL.
    async fn save(&self, folder: MediaFolder, file_name: &str, bytes: &[u8]) -> Result<String, MediaStoreError>;
    async fn load(&self, folder: MediaFolder, file_name: &str) -> Result<Vec<u8>, MediaStoreError>;
    /// Succeeds when the file is already gone.
    async fn delete(&self, folder: MediaFolder, file_name: &str) -> Result<(), MediaStoreError>;
}

// ---------------- Filesystem implementation (public static directory) ----------------
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        info!("media store rooted at '{}'", root.display());
        Self { root }
    }

    fn path_for(&self, folder: MediaFolder, file_name: &str) -> Result<PathBuf, MediaStoreError> {
        if !is_plain_file_name(file_name) {
            return Err(MediaStoreError::NotFound);
        }
        Ok(self.root.join(folder.as_str()).join(file_name))
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn save(&self, folder: MediaFolder, file_name: &str, bytes: &[u8]) -> Result<String, MediaStoreError> {
        let path = self.path_for(folder, file_name)?;
        let dir = self.root.join(folder.as_str());
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            error!("create_dir_all '{}' failed: {e}", dir.display());
            MediaStoreError::Io(e.to_string())
        })?;
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            error!("write '{}' failed: {e}", path.display());
            MediaStoreError::Io(e.to_string())
        })?;
        Ok(MediaPath { folder, file_name: file_name.to_string() }.url())
    }

    async fn load(&self, folder: MediaFolder, file_name: &str) -> Result<Vec<u8>, MediaStoreError> {
        let path = self.path_for(folder, file_name)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => MediaStoreError::NotFound,
            _ => MediaStoreError::Io(e.to_string()),
        })
    }

    async fn delete(&self, folder: MediaFolder, file_name: &str) -> Result<(), MediaStoreError> {
        let path = self.path_for(folder, file_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("remove '{}' failed: {e}", path.display());
                Err(MediaStoreError::Io(e.to_string()))
            }
        }
    }
}
