//! Item processors for the three batch kinds

use crate::batch::BatchKind;
use crate::pipeline::ItemProcessor;
use crate::{MigrationError, Result};
use async_trait::async_trait;
use bridge_traits::storage::{FileSystemAccess, ObjectStore, StoredObject};
use core_imaging::{EditorContext, TransformCoordinator};
use core_library::{
    AttachmentMetadata, CatalogItem, CatalogRepository, DerivativeMetadata, RemoteMarker,
};
use core_runtime::config::DerivativeSizes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

fn marker_for(store: &dyn ObjectStore, stored: &StoredObject, mime_type: &str) -> RemoteMarker {
    RemoteMarker {
        provider: store.provider().to_string(),
        bucket: store.bucket().to_string(),
        key: stored.key.clone(),
        url: stored.url.clone(),
        mime_type: mime_type.to_string(),
    }
}

/// Object key of a file next to the item's original
fn sibling_key(item: &CatalogItem, file: &str) -> String {
    match item.directory() {
        "" => file.to_string(),
        dir => format!("{}/{}", dir, file),
    }
}

// ============================================================================
// Import
// ============================================================================

/// Copies an item's original and derivatives to remote storage and marks
/// them in the catalog.
///
/// Files are uploaded as they are on disk. Going through
/// [`TransformCoordinator::save`] would decode and re-encode every image,
/// changing the bytes (and losing quality) of files that need no edit, so
/// the coordinator is only used to read dimensions the catalog lacks.
pub struct ImportProcessor {
    catalog: Arc<dyn CatalogRepository>,
    store: Arc<dyn ObjectStore>,
    fs: Arc<dyn FileSystemAccess>,
    editors: EditorContext,
    upload_root: PathBuf,
}

impl ImportProcessor {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        store: Arc<dyn ObjectStore>,
        fs: Arc<dyn FileSystemAccess>,
        editors: EditorContext,
        upload_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            store,
            fs,
            editors,
            upload_root: upload_root.into(),
        }
    }

    async fn upload_file(&self, path: &Path, key: &str, mime_type: &str) -> Result<StoredObject> {
        let data = self.fs.read_file(path).await?;
        self.store
            .upload(key, data, mime_type)
            .await
            .map_err(|source| MigrationError::RemoteTransferFailed {
                key: key.to_string(),
                source,
            })
    }

    /// Metadata to start from, with dimensions filled in for images that
    /// have none recorded
    async fn base_metadata(&self, item: &CatalogItem, path: &Path) -> Result<AttachmentMetadata> {
        let mut metadata = self
            .catalog
            .get_metadata(item.id)
            .await?
            .unwrap_or_else(|| AttachmentMetadata::new(&item.attached_file, 0, 0));

        if item.is_image() && (metadata.width == 0 || metadata.height == 0) {
            let reference = path.to_string_lossy();
            let coordinator = TransformCoordinator::load(&reference, &self.editors).await?;
            let size = coordinator.current_size();
            metadata.width = size.width;
            metadata.height = size.height;
        }
        if metadata.mime_type.is_none() {
            metadata.mime_type = Some(item.mime_type.clone());
        }
        Ok(metadata)
    }
}

#[async_trait]
impl ItemProcessor for ImportProcessor {
    fn kind(&self) -> BatchKind {
        BatchKind::Import
    }

    async fn process(&self, item: &CatalogItem) -> Result<()> {
        let path = self.upload_root.join(&item.attached_file);
        if !self.fs.is_file(&path).await? {
            return Err(MigrationError::ItemFileMissing {
                item_id: item.id,
                path: path.display().to_string(),
            });
        }

        let mut metadata = self.base_metadata(item, &path).await?;

        let original = match &metadata.remote {
            Some(marker) if self.store.exists(&marker.key).await? => {
                debug!(item_id = %item.id, key = %marker.key, "Original already remote");
                marker.clone()
            }
            _ => {
                let stored = self
                    .upload_file(&path, &item.attached_file, &item.mime_type)
                    .await?;
                marker_for(self.store.as_ref(), &stored, &item.mime_type)
            }
        };
        metadata.remote = Some(original.clone());

        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        for (name, derivative) in metadata.sizes.iter_mut() {
            if derivative.remote.is_some() {
                continue;
            }
            if derivative.file == item.file_name() {
                derivative.remote = Some(original.clone());
                continue;
            }

            let derivative_path = directory.join(&derivative.file);
            if !self.fs.is_file(&derivative_path).await? {
                warn!(item_id = %item.id, size = %name, file = %derivative.file, "Derivative file missing");
                continue;
            }

            let key = sibling_key(item, &derivative.file);
            let stored = self
                .upload_file(&derivative_path, &key, &derivative.mime_type)
                .await?;
            derivative.remote = Some(marker_for(
                self.store.as_ref(),
                &stored,
                &derivative.mime_type,
            ));
        }

        self.catalog.update_metadata(item.id, &metadata).await?;
        Ok(())
    }
}

// ============================================================================
// Regenerate
// ============================================================================

/// Recomputes derivative metadata from the configured size table
pub struct RegenerateProcessor {
    catalog: Arc<dyn CatalogRepository>,
    editors: EditorContext,
    upload_root: PathBuf,
    sizes: DerivativeSizes,
}

impl RegenerateProcessor {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        editors: EditorContext,
        upload_root: impl Into<PathBuf>,
        sizes: DerivativeSizes,
    ) -> Self {
        Self {
            catalog,
            editors,
            upload_root: upload_root.into(),
            sizes,
        }
    }
}

#[async_trait]
impl ItemProcessor for RegenerateProcessor {
    fn kind(&self) -> BatchKind {
        BatchKind::RegenerateThumbnails
    }

    /// No existence check: a missing source fails in the editor and counts
    /// as a failure, not a skip
    async fn process(&self, item: &CatalogItem) -> Result<()> {
        let existing = self.catalog.get_metadata(item.id).await?;

        let reference = match existing.as_ref().and_then(|m| m.remote.as_ref()) {
            Some(marker) => marker.url.clone(),
            None => self
                .upload_root
                .join(&item.attached_file)
                .to_string_lossy()
                .into_owned(),
        };

        let mut coordinator = TransformCoordinator::load(&reference, &self.editors).await?;
        let generated = coordinator.multi_resize(&self.sizes).await?;
        let size = coordinator.current_size();

        let mut metadata = existing
            .clone()
            .unwrap_or_else(|| AttachmentMetadata::new(&item.attached_file, size.width, size.height));
        metadata.width = size.width;
        metadata.height = size.height;
        if metadata.mime_type.is_none() {
            metadata.mime_type = Some(item.mime_type.clone());
        }

        let previous = existing.map(|m| m.sizes).unwrap_or_default();
        metadata.sizes = generated
            .into_iter()
            .map(|(name, result)| {
                let remote = previous.get(&name).and_then(|d| d.remote.clone());
                let derivative = DerivativeMetadata {
                    file: result.file,
                    width: result.width,
                    height: result.height,
                    mime_type: result.mime_type,
                    remote,
                };
                (name, derivative)
            })
            .collect();

        debug!(item_id = %item.id, sizes = metadata.sizes.len(), "Derivatives regenerated");
        self.catalog.update_metadata(item.id, &metadata).await?;
        Ok(())
    }
}

// ============================================================================
// Unlink
// ============================================================================

/// Detaches items from remote storage in the catalog only
pub struct UnlinkProcessor {
    catalog: Arc<dyn CatalogRepository>,
}

impl UnlinkProcessor {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ItemProcessor for UnlinkProcessor {
    fn kind(&self) -> BatchKind {
        BatchKind::Unlink
    }

    async fn process(&self, item: &CatalogItem) -> Result<()> {
        let Some(mut metadata) = self.catalog.get_metadata(item.id).await? else {
            return Ok(());
        };

        if metadata.strip_remote_markers() {
            self.catalog.update_metadata(item.id, &metadata).await?;
            debug!(item_id = %item.id, "Remote markers removed");
        }
        Ok(())
    }
}
