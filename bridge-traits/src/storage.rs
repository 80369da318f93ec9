//! Storage Abstractions
//!
//! Provides traits for local file I/O and for the remote object store that
//! media is migrated to.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts the local file I/O the core performs: checking that catalog
/// files exist, reading originals for upload and writing scratch copies of
/// remote objects.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn scratch_copy(fs: &dyn FileSystemAccess, data: Bytes) -> Result<PathBuf> {
///     let path = fs.get_cache_directory().await?.join("copy.jpg");
///     fs.write_file(&path, data).await?;
///     Ok(path)
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Get the application's cache directory
    ///
    /// Scratch copies of remote objects are placed below this directory.
    async fn get_cache_directory(&self) -> Result<PathBuf>;

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Check that `path` exists and is a regular file
    async fn is_file(&self, path: &Path) -> Result<bool> {
        if !self.exists(path).await? {
            return Ok(false);
        }
        Ok(!self.metadata(path).await?.is_directory)
    }
}

/// An object that was written to remote storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Key of the object inside its bucket
    pub key: String,
    /// Public URL of the object
    pub url: String,
    /// Number of bytes written
    pub size: u64,
}

/// Remote object storage trait
///
/// Objects are addressed by key for writes and by URL for reads, so that
/// references stored in the catalog can be fetched without knowing which
/// bucket produced them.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::ObjectStore;
///
/// async fn ensure_uploaded(store: &dyn ObjectStore, key: &str, data: Bytes) -> Result<String> {
///     if !store.exists(key).await? {
///         store.upload(key, data, "image/jpeg").await?;
///     }
///     Ok(store.url_for(key))
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short provider name recorded in catalog markers (e.g. `s3`)
    fn provider(&self) -> &str;

    /// Bucket (or container) objects are written to
    fn bucket(&self) -> &str;

    /// Public URL for `key`
    fn url_for(&self, key: &str) -> String;

    /// Inverse of [`url_for`](Self::url_for); `None` when the URL does not
    /// point into this store
    fn key_for(&self, url: &str) -> Option<String>;

    /// Check whether an object exists under `key`
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Upload `data` under `key`, replacing any existing object
    async fn upload(&self, key: &str, data: Bytes, mime_type: &str) -> Result<StoredObject>;

    /// Download the object at `url` into `destination`
    ///
    /// Returns the number of bytes written.
    async fn download_to(&self, url: &str, destination: &Path) -> Result<u64>;
}
