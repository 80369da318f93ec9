//! # Transform Coordinator
//!
//! Routes transforms for one asset to the editor matching its location and
//! keeps the caller-visible (logical) size in step with the geometry
//! planner, whether or not the editor has touched pixels yet.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let ctx = EditorContext::new(fs, scratch_dir).with_store(store);
//! let mut coordinator = TransformCoordinator::load("/srv/uploads/2024/photo.jpg", &ctx).await?;
//! coordinator.resize(Some(150), Some(150), true).await?;
//! let derivatives = coordinator.multi_resize(&config.derivative_sizes).await?;
//! ```

use bridge_traits::storage::{FileSystemAccess, ObjectStore};
use bytes::Bytes;
use core_library::CatalogRepository;
use core_runtime::config::DerivativeSizes;
use core_runtime::logging::strip_path;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::editor::{
    metadata_mime, quarter_turns, AssetLocation, DerivativeResult, ImageEditor, ImageMetadata,
};
use crate::error::{ImagingError, Result};
use crate::geometry::{plan_resize, Rect, ResizePlan, Size};
use crate::local::LocalImageEditor;
use crate::remote::RemoteImageEditor;

/// Collaborators needed to build an editor for any location
#[derive(Clone)]
pub struct EditorContext {
    pub fs: Arc<dyn FileSystemAccess>,
    pub scratch_dir: PathBuf,
    pub store: Option<Arc<dyn ObjectStore>>,
    pub catalog: Option<Arc<dyn CatalogRepository>>,
    /// Root that local paths are keyed against when uploaded
    pub upload_root: Option<PathBuf>,
}

impl EditorContext {
    pub fn new(fs: Arc<dyn FileSystemAccess>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            scratch_dir: scratch_dir.into(),
            store: None,
            catalog: None,
            upload_root: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogRepository>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_upload_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.upload_root = Some(root.into());
        self
    }

    fn editor_for(&self, reference: &str, location: &AssetLocation) -> Result<Box<dyn ImageEditor>> {
        match location {
            AssetLocation::Local { path } => Ok(Box::new(LocalImageEditor::new(path.clone()))),
            AssetLocation::Remote { .. } => {
                let store = self.store.clone().ok_or_else(|| {
                    ImagingError::Unsupported(format!(
                        "no object store configured for {}",
                        reference
                    ))
                })?;
                let mut editor =
                    RemoteImageEditor::new(reference, store, self.fs.clone(), &self.scratch_dir);
                if let Some(catalog) = &self.catalog {
                    editor = editor.with_catalog(catalog.clone());
                }
                Ok(Box::new(editor))
            }
        }
    }
}

/// Classify an asset reference as local or remote
pub fn resolve_location(reference: &str) -> AssetLocation {
    AssetLocation::resolve(reference)
}

pub struct TransformCoordinator {
    source: String,
    location: AssetLocation,
    editor: Box<dyn ImageEditor>,
    store: Option<Arc<dyn ObjectStore>>,
    upload_root: Option<PathBuf>,
    size: Size,
}

impl TransformCoordinator {
    /// Load `reference` with the editor matching its location
    #[instrument(skip(ctx))]
    pub async fn load(reference: &str, ctx: &EditorContext) -> Result<Self> {
        let location = resolve_location(reference);
        let editor = ctx.editor_for(reference, &location)?;
        let coordinator = Self::with_editor(reference, editor, ctx.store.clone()).await?;
        Ok(match &ctx.upload_root {
            Some(root) => coordinator.with_upload_root(root.clone()),
            None => coordinator,
        })
    }

    /// Load through an already constructed editor
    pub async fn with_editor(
        reference: &str,
        mut editor: Box<dyn ImageEditor>,
        store: Option<Arc<dyn ObjectStore>>,
    ) -> Result<Self> {
        editor.load().await?;
        let size = editor.current_size().ok_or(ImagingError::NotLoaded)?;

        debug!(
            file = strip_path(reference),
            remote = editor.location().is_remote(),
            width = size.width,
            height = size.height,
            "Asset loaded"
        );

        Ok(Self {
            source: reference.to_string(),
            location: editor.location().clone(),
            editor,
            store,
            upload_root: None,
            size,
        })
    }

    /// Key local uploads by their path relative to `root`
    pub fn with_upload_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.upload_root = Some(root.into());
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn location(&self) -> &AssetLocation {
        &self.location
    }

    /// Logical size
    pub fn current_size(&self) -> Size {
        self.size
    }

    pub fn is_animated_format(&self) -> bool {
        self.editor.is_animated_format()
    }

    pub fn mime_type(&self) -> &str {
        self.editor.mime_type()
    }

    /// Fit within `(max_w, max_h)`, or cover-crop to exactly that size
    pub async fn resize(&mut self, max_w: Option<u32>, max_h: Option<u32>, crop: bool) -> Result<()> {
        match plan_resize(self.size, max_w, max_h, crop) {
            ResizePlan::Unchanged => {}
            ResizePlan::Fit(size) => {
                self.editor.resize(max_w, max_h, false).await?;
                self.size = size;
            }
            ResizePlan::Crop { source, target } => {
                self.editor.crop(source, target).await?;
                self.size = target;
            }
        }
        Ok(())
    }

    /// Extract a region and scale it to `target` (the region's own size when
    /// `None`).
    ///
    /// With `absolute` set, the region's width and height are read as the
    /// coordinates of its far corner.
    pub async fn crop(&mut self, region: Rect, target: Option<Size>, absolute: bool) -> Result<()> {
        let source = if absolute {
            Rect::new(
                region.x,
                region.y,
                region.width.saturating_sub(region.x),
                region.height.saturating_sub(region.y),
            )
        } else {
            region
        };
        let target = target.unwrap_or_else(|| source.size());

        self.editor.crop(source, target).await?;
        self.size = target;
        Ok(())
    }

    /// Rotate counter-clockwise
    pub async fn rotate(&mut self, degrees: i32) -> Result<()> {
        let turns = quarter_turns(degrees)?;
        self.editor.rotate(degrees).await?;
        if turns % 180 != 0 {
            self.size = self.size.transposed();
        }
        Ok(())
    }

    pub async fn flip(&mut self, horizontal: bool, vertical: bool) -> Result<()> {
        self.editor.flip(horizontal, vertical).await
    }

    pub async fn stream(&mut self, mime_type: Option<&str>) -> Result<Bytes> {
        self.editor.stream(mime_type).await
    }

    /// Metadata for every bounded derivative in `sizes`.
    ///
    /// Remote assets use the editor's own multi-size primitive. Local assets
    /// plan each derivative from the logical size, which is restored after
    /// every entry so siblings never see each other's result.
    pub async fn multi_resize(
        &mut self,
        sizes: &DerivativeSizes,
    ) -> Result<BTreeMap<String, DerivativeResult>> {
        if self.location.is_remote() {
            return self.editor.multi_resize(sizes).await;
        }

        let file = self.location.file_name();
        let mime = metadata_mime(self.is_animated_format());
        let mut results = BTreeMap::new();

        for (name, spec) in sizes {
            if spec.is_unbounded() {
                continue;
            }

            let original = self.size;
            self.size = plan_resize(original, spec.width, spec.height, spec.wants_crop())
                .result_size(original);

            results.insert(
                name.clone(),
                DerivativeResult {
                    file: file.clone(),
                    width: self.size.width,
                    height: self.size.height,
                    mime_type: mime.to_string(),
                },
            );

            self.size = original;
        }

        Ok(results)
    }

    /// Persist or describe the current image.
    ///
    /// A remote `destination` is written through the remote backend: remote
    /// assets save through their editor, local assets are encoded and
    /// uploaded. `prefer_remote_save` sends the save to the remote backend
    /// even without a destination; a local asset is then uploaded under the
    /// key of its own path, provided a store is configured. In every other
    /// case nothing is written and the logical metadata is returned.
    pub async fn save(
        &mut self,
        destination: Option<&str>,
        mime_type: Option<&str>,
        prefer_remote_save: bool,
    ) -> Result<ImageMetadata> {
        let target = destination.map(resolve_location);

        match &target {
            Some(AssetLocation::Remote { url, .. }) if !self.location.is_remote() => {
                let store = self.require_store(url)?;
                let key = store
                    .key_for(url)
                    .ok_or_else(|| ImagingError::InvalidReference(url.clone()))?;
                return self.upload_local(store, &key, mime_type).await;
            }
            Some(AssetLocation::Remote { .. }) => {
                return self.editor.save(destination, mime_type).await;
            }
            _ if prefer_remote_save && self.location.is_remote() => {
                return self.editor.save(destination, mime_type).await;
            }
            None if prefer_remote_save => {
                if let Some(store) = self.store.clone() {
                    let key = self.local_key();
                    return self.upload_local(store, &key, mime_type).await;
                }
                debug!(file = strip_path(&self.source), "No object store, keeping save local");
            }
            _ => {}
        }

        let file = target
            .as_ref()
            .map(AssetLocation::file_name)
            .unwrap_or_else(|| self.location.file_name());

        Ok(ImageMetadata {
            file,
            width: self.size.width,
            height: self.size.height,
            mime_type: mime_type.unwrap_or(self.editor.mime_type()).to_string(),
        })
    }

    fn require_store(&self, url: &str) -> Result<Arc<dyn ObjectStore>> {
        self.store.clone().ok_or_else(|| {
            ImagingError::Unsupported(format!("no object store configured for {}", url))
        })
    }

    /// Object key for the local source: its path below the upload root, or
    /// its file name when it lies elsewhere
    fn local_key(&self) -> String {
        let AssetLocation::Local { path } = &self.location else {
            return self.location.file_name();
        };
        self.upload_root
            .as_ref()
            .and_then(|root| path.strip_prefix(root).ok())
            .map(|relative| {
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| self.location.file_name())
    }

    async fn upload_local(
        &mut self,
        store: Arc<dyn ObjectStore>,
        key: &str,
        mime_type: Option<&str>,
    ) -> Result<ImageMetadata> {
        let data = self.editor.stream(mime_type).await?;
        let mime = mime_type.unwrap_or(self.editor.mime_type()).to_string();
        let stored = store.upload(key, data, &mime).await?;

        debug!(key = %stored.key, bytes = stored.size, "Uploaded local image");

        Ok(ImageMetadata {
            file: stored.key.rsplit('/').next().unwrap_or(&stored.key).to_string(),
            width: self.size.width,
            height: self.size.height,
            mime_type: mime,
        })
    }
}
