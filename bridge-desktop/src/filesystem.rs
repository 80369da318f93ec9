//! Local file access on top of `tokio::fs`

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tracing::debug;

/// Attach the offending path to `NotFound` failures
trait AtPath<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> AtPath<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BridgeError::NotFound(path.display().to_string()),
            _ => BridgeError::Io(e),
        })
    }
}

/// Desktop [`FileSystemAccess`].
///
/// The cache directory holds scratch copies of remote originals while they
/// are transformed; it defaults to `<platform cache>/mediacloud`.
pub struct TokioFileSystem {
    cache_dir: PathBuf,
}

impl TokioFileSystem {
    pub fn new() -> Self {
        Self::with_cache_directory(
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("mediacloud"),
        )
    }

    pub fn with_cache_directory(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn get_cache_directory(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.cache_dir).await.at(&self.cache_dir)?;
        Ok(self.cache_dir.clone())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let meta = fs::metadata(path).await.at(path)?;
        let modified_at = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);

        Ok(FileMetadata {
            size: meta.len(),
            modified_at,
            is_directory: meta.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.at(path)
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.at(path)?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.at(parent)?;
        }
        fs::write(path, &data).await.at(path)?;
        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.at(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_custom_cache_directory_is_created() {
        let root = tempfile::tempdir().unwrap();
        let cache = root.path().join("scratch");
        let fs = TokioFileSystem::with_cache_directory(cache.clone());

        let cache_dir = fs.get_cache_directory().await.unwrap();
        assert_eq!(cache_dir, cache);
        assert!(cache.is_dir());
    }

    #[tokio::test]
    async fn test_write_read_and_delete() {
        let root = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::with_cache_directory(root.path().to_path_buf());
        let file = root.path().join("2024/05/photo.jpg");

        let data = Bytes::from_static(b"not really a jpeg");
        fs.write_file(&file, data.clone()).await.unwrap();

        assert!(fs.is_file(&file).await.unwrap());
        assert!(!fs.is_file(file.parent().unwrap()).await.unwrap());
        assert_eq!(fs.read_file(&file).await.unwrap(), data);
        assert_eq!(fs.metadata(&file).await.unwrap().size, data.len() as u64);

        fs.delete_file(&file).await.unwrap();
        assert!(!fs.exists(&file).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_maps_to_not_found() {
        let root = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::with_cache_directory(root.path().to_path_buf());

        let err = fs.read_file(&root.path().join("missing.png")).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }
}
