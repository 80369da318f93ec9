//! Editor for images already held by remote object storage.
//!
//! Dimensions come from the catalog when a record for the object exists, so
//! loading usually transfers no pixels. Pixel operations are recorded and
//! only replayed, against a scratch copy, when the image is streamed or
//! saved.

use async_trait::async_trait;
use bridge_traits::storage::{FileSystemAccess, ObjectStore};
use bytes::Bytes;
use core_library::CatalogRepository;
use core_runtime::config::DerivativeSizes;
use image::ImageFormat;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::editor::{
    metadata_mime, quarter_turns, AssetLocation, DerivativeResult, ImageEditor, ImageMetadata,
    MIME_GIF, MIME_JPEG,
};
use crate::error::{ImagingError, Result};
use crate::geometry::{plan_resize, Rect, ResizePlan, Size};
use crate::local::LocalImageEditor;

/// A recorded pixel operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingEdit {
    Resize {
        max_w: Option<u32>,
        max_h: Option<u32>,
        crop: bool,
    },
    Crop {
        source: Rect,
        target: Size,
    },
    Rotate(i32),
    Flip {
        horizontal: bool,
        vertical: bool,
    },
}

pub struct RemoteImageEditor {
    location: AssetLocation,
    url: String,
    store: Arc<dyn ObjectStore>,
    catalog: Option<Arc<dyn CatalogRepository>>,
    fs: Arc<dyn FileSystemAccess>,
    scratch_root: PathBuf,
    /// Scratch copy downloaded by this editor
    scratch: Option<PathBuf>,
    format: Option<ImageFormat>,
    size: Option<Size>,
    pending: Vec<PendingEdit>,
}

impl RemoteImageEditor {
    pub fn new(
        url: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        fs: Arc<dyn FileSystemAccess>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        let url = url.into();
        let location = AssetLocation::resolve(&url);
        let format = ImageFormat::from_path(location.file_name()).ok();

        Self {
            location,
            url,
            store,
            catalog: None,
            fs,
            scratch_root: scratch_root.into(),
            scratch: None,
            format,
            size: None,
            pending: Vec::new(),
        }
    }

    /// Look dimensions up in the catalog before downloading
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogRepository>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of recorded operations not yet written back
    pub fn pending_edits(&self) -> usize {
        self.pending.len()
    }

    fn loaded_size(&self) -> Result<Size> {
        self.size.ok_or(ImagingError::NotLoaded)
    }

    fn record(&mut self, edit: PendingEdit, size: Size) {
        self.pending.push(edit);
        self.size = Some(size);
    }

    async fn catalog_dimensions(&self) -> Result<Option<Size>> {
        let Some(catalog) = &self.catalog else {
            return Ok(None);
        };

        let suffix = url_path(&self.url);
        let found = catalog.find_by_path_suffix(suffix).await?;
        Ok(found
            .map(|metadata| Size::new(metadata.width, metadata.height))
            .filter(|size| !size.is_empty()))
    }

    fn scratch_path(&self) -> Result<PathBuf> {
        scratch_path_for(&self.scratch_root, &self.url)
    }

    /// Download the object into scratch once per editor.
    ///
    /// A file already sitting at the scratch path (left by another run) is
    /// never trusted and gets replaced.
    async fn fetch(&mut self) -> Result<PathBuf> {
        if let Some(path) = &self.scratch {
            return Ok(path.clone());
        }

        let path = self.scratch_path()?;
        if let Some(parent) = path.parent() {
            self.fs.create_dir_all(parent).await?;
        }
        let bytes = self.store.download_to(&self.url, &path).await?;

        debug!(url = %self.url, path = ?path, bytes, "Fetched remote image to scratch");
        self.scratch = Some(path.clone());
        Ok(path)
    }

    /// Scratch copy with every recorded edit applied
    async fn materialize(&mut self) -> Result<LocalImageEditor> {
        let path = self.fetch().await?;
        let mut editor = LocalImageEditor::new(path);
        editor.load().await?;

        for edit in &self.pending {
            match *edit {
                PendingEdit::Resize { max_w, max_h, crop } => {
                    editor.resize(max_w, max_h, crop).await?
                }
                PendingEdit::Crop { source, target } => editor.crop(source, target).await?,
                PendingEdit::Rotate(degrees) => editor.rotate(degrees).await?,
                PendingEdit::Flip {
                    horizontal,
                    vertical,
                } => editor.flip(horizontal, vertical).await?,
            }
        }

        Ok(editor)
    }

    async fn discard_scratch(&mut self) {
        let Some(path) = self.scratch.take() else {
            return;
        };
        if let Err(e) = self.fs.delete_file(&path).await {
            warn!(path = ?path, error = %e, "Failed to remove scratch copy");
        }
    }
}

/// Path component of a URL, without query or fragment
fn url_path(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let trimmed = &url[..end];
    match trimmed.find("://") {
        Some(idx) => {
            let rest = &trimmed[idx + 3..];
            rest.find('/').map(|slash| &rest[slash..]).unwrap_or("")
        }
        None => trimmed,
    }
}

/// Scratch location mirroring the object's directory under `root`.
///
/// Relative segments are dropped and the file name is reduced to printable
/// ASCII so that no URL can address a path outside `root`.
pub(crate) fn scratch_path_for(root: &Path, url: &str) -> Result<PathBuf> {
    let path = url_path(url);
    let mut segments: Vec<&str> = path.split('/').collect();
    let name = segments.pop().unwrap_or_default();

    let name: String = name
        .chars()
        .filter(|c| (' '..='~').contains(c) && *c != '\\')
        .collect();
    if name.is_empty() || name == "." || name == ".." {
        return Err(ImagingError::InvalidReference(url.to_string()));
    }

    let mut scratch = root.to_path_buf();
    for segment in segments {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            continue;
        }
        scratch.push(segment);
    }
    scratch.push(name);
    Ok(scratch)
}

fn file_name_of(key: &str) -> String {
    key.rsplit('/').next().unwrap_or(key).to_string()
}

#[async_trait]
impl ImageEditor for RemoteImageEditor {
    fn location(&self) -> &AssetLocation {
        &self.location
    }

    async fn load(&mut self) -> Result<()> {
        if self.size.is_some() {
            return Ok(());
        }

        if let Some(size) = self.catalog_dimensions().await? {
            debug!(url = %self.url, width = size.width, height = size.height, "Dimensions from catalog");
            self.size = Some(size);
            return Ok(());
        }

        let path = self.fetch().await?;
        let mut local = LocalImageEditor::new(&path);
        local.load().await?;

        self.size = local.current_size();
        if self.format.is_none() && local.is_animated_format() {
            self.format = Some(ImageFormat::Gif);
        }
        Ok(())
    }

    fn current_size(&self) -> Option<Size> {
        self.size
    }

    fn is_animated_format(&self) -> bool {
        self.format == Some(ImageFormat::Gif)
    }

    fn mime_type(&self) -> &str {
        match self.format {
            Some(ImageFormat::Gif) => MIME_GIF,
            Some(format) => format.to_mime_type(),
            None => MIME_JPEG,
        }
    }

    async fn resize(&mut self, max_w: Option<u32>, max_h: Option<u32>, crop: bool) -> Result<()> {
        let current = self.loaded_size()?;
        let plan = plan_resize(current, max_w, max_h, crop);
        if plan == ResizePlan::Unchanged {
            return Ok(());
        }

        self.record(
            PendingEdit::Resize { max_w, max_h, crop },
            plan.result_size(current),
        );
        Ok(())
    }

    async fn crop(&mut self, source: Rect, target: Size) -> Result<()> {
        let current = self.loaded_size()?;
        if !source.fits_in(current) {
            return Err(ImagingError::Unsupported(format!(
                "crop region {:?} outside {}x{}",
                source, current.width, current.height
            )));
        }

        self.record(PendingEdit::Crop { source, target }, target);
        Ok(())
    }

    async fn rotate(&mut self, degrees: i32) -> Result<()> {
        let current = self.loaded_size()?;
        let turns = quarter_turns(degrees)?;
        if turns == 0 {
            return Ok(());
        }

        let size = if turns == 180 {
            current
        } else {
            current.transposed()
        };
        self.record(PendingEdit::Rotate(turns), size);
        Ok(())
    }

    async fn flip(&mut self, horizontal: bool, vertical: bool) -> Result<()> {
        let current = self.loaded_size()?;
        if horizontal || vertical {
            self.record(
                PendingEdit::Flip {
                    horizontal,
                    vertical,
                },
                current,
            );
        }
        Ok(())
    }

    async fn stream(&mut self, mime_type: Option<&str>) -> Result<Bytes> {
        self.loaded_size()?;
        let mut editor = self.materialize().await?;
        editor.stream(mime_type).await
    }

    async fn save(
        &mut self,
        destination: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<ImageMetadata> {
        self.loaded_size()?;

        let target = destination
            .map(AssetLocation::resolve)
            .unwrap_or_else(|| self.location.clone());

        let key = match &target {
            AssetLocation::Local { path } => {
                let mut editor = self.materialize().await?;
                let dest = path.to_string_lossy();
                return editor.save(Some(&*dest), mime_type).await;
            }
            AssetLocation::Remote { url, .. } => self
                .store
                .key_for(url)
                .ok_or_else(|| ImagingError::InvalidReference(url.clone()))?,
        };

        let mut editor = self.materialize().await?;
        let data = editor.stream(mime_type).await?;
        let mime = mime_type.unwrap_or(editor.mime_type()).to_string();
        let size = editor.current_size().ok_or(ImagingError::NotLoaded)?;

        let stored = self.store.upload(&key, data, &mime).await?;
        debug!(key = %stored.key, bytes = stored.size, "Uploaded edited image");

        if target == self.location {
            // The object now holds the edits
            self.pending.clear();
            self.size = Some(size);
            self.discard_scratch().await;
        }

        Ok(ImageMetadata {
            file: file_name_of(&stored.key),
            width: size.width,
            height: size.height,
            mime_type: mime,
        })
    }

    async fn multi_resize(
        &mut self,
        sizes: &DerivativeSizes,
    ) -> Result<BTreeMap<String, DerivativeResult>> {
        let current = self.loaded_size()?;
        let file = self.location.file_name();
        let mime = metadata_mime(self.is_animated_format());

        let results = sizes
            .iter()
            .filter(|(_, spec)| !spec.is_unbounded())
            .map(|(name, spec)| {
                let size = plan_resize(current, spec.width, spec.height, spec.wants_crop())
                    .result_size(current);
                (
                    name.clone(),
                    DerivativeResult {
                        file: file.clone(),
                        width: size.width,
                        height: size.height,
                        mime_type: mime.to_string(),
                    },
                )
            })
            .collect();

        Ok(results)
    }
}
