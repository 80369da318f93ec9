//! Editor for images on the local filesystem, backed by the `image` crate.
//!
//! `load` only reads the header; pixels are decoded on the first edit.

use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::editor::{quarter_turns, AssetLocation, ImageEditor, ImageMetadata, MIME_GIF, MIME_JPEG};
use crate::error::{ImagingError, Result};
use crate::geometry::{plan_resize, Rect, ResizePlan, Size};

pub struct LocalImageEditor {
    location: AssetLocation,
    path: PathBuf,
    format: Option<ImageFormat>,
    size: Option<Size>,
    image: Option<DynamicImage>,
}

impl LocalImageEditor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            location: AssetLocation::Local { path: path.clone() },
            path,
            format: None,
            size: None,
            image: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn loaded_size(&self) -> Result<Size> {
        self.size.ok_or(ImagingError::NotLoaded)
    }

    async fn decoded(&mut self) -> Result<&mut DynamicImage> {
        if self.image.is_none() {
            let path = self.path.clone();
            let image = tokio::task::spawn_blocking(move || image::open(path))
                .await
                .map_err(|e| ImagingError::Task(e.to_string()))??;
            self.image = Some(image);
        }
        self.image.as_mut().ok_or(ImagingError::NotLoaded)
    }

    async fn transform<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&DynamicImage) -> DynamicImage + Send,
    {
        let image = self.decoded().await?;
        *image = f(image);
        Ok(())
    }

    fn output_format(&self, mime_type: Option<&str>, target: Option<&Path>) -> Result<ImageFormat> {
        if let Some(mime) = mime_type {
            return ImageFormat::from_mime_type(mime)
                .ok_or_else(|| ImagingError::Unsupported(format!("output mime type {}", mime)));
        }
        Ok(target
            .and_then(|path| ImageFormat::from_path(path).ok())
            .or(self.format)
            .unwrap_or(ImageFormat::Jpeg))
    }

    async fn encode(&mut self, format: ImageFormat) -> Result<Vec<u8>> {
        let image = self.decoded().await?;
        let mut buffer = Cursor::new(Vec::new());
        if format == ImageFormat::Jpeg && image.color().has_alpha() {
            // JPEG has no alpha channel
            DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut buffer, format)?;
        } else {
            image.write_to(&mut buffer, format)?;
        }
        Ok(buffer.into_inner())
    }
}

fn reject_empty(size: Size) -> Result<()> {
    if size.is_empty() {
        return Err(ImagingError::Unsupported(format!(
            "zero-sized result {}x{}",
            size.width, size.height
        )));
    }
    Ok(())
}

#[async_trait]
impl ImageEditor for LocalImageEditor {
    fn location(&self) -> &AssetLocation {
        &self.location
    }

    async fn load(&mut self) -> Result<()> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Err(ImagingError::NotFound(self.path.display().to_string()));
        }

        let path = self.path.clone();
        let (format, dimensions) = tokio::task::spawn_blocking(move || -> Result<_> {
            let reader = ImageReader::open(&path)?.with_guessed_format()?;
            let format = reader.format();
            let dimensions = reader.into_dimensions()?;
            Ok((format, dimensions))
        })
        .await
        .map_err(|e| ImagingError::Task(e.to_string()))??;

        self.format = format;
        self.size = Some(Size::new(dimensions.0, dimensions.1));
        self.image = None;

        debug!(
            path = ?self.path,
            width = dimensions.0,
            height = dimensions.1,
            "Loaded local image"
        );
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

        match plan {
            ResizePlan::Unchanged => return Ok(()),
            ResizePlan::Fit(size) => {
                reject_empty(size)?;
                self.transform(|img| img.resize_exact(size.width, size.height, FilterType::Lanczos3))
                    .await?;
            }
            ResizePlan::Crop { source, target } => {
                reject_empty(target)?;
                self.transform(|img| {
                    img.crop_imm(source.x, source.y, source.width, source.height)
                        .resize_exact(target.width, target.height, FilterType::Lanczos3)
                })
                .await?;
            }
        }

        self.size = Some(plan.result_size(current));
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
        reject_empty(source.size())?;
        reject_empty(target)?;

        self.transform(|img| {
            let cropped = img.crop_imm(source.x, source.y, source.width, source.height);
            if source.size() == target {
                cropped
            } else {
                cropped.resize_exact(target.width, target.height, FilterType::Lanczos3)
            }
        })
        .await?;

        self.size = Some(target);
        Ok(())
    }

    async fn rotate(&mut self, degrees: i32) -> Result<()> {
        let current = self.loaded_size()?;
        let turns = quarter_turns(degrees)?;

        match turns {
            90 => self.transform(|img| img.rotate270()).await?,
            180 => self.transform(|img| img.rotate180()).await?,
            270 => self.transform(|img| img.rotate90()).await?,
            _ => return Ok(()),
        }

        if turns != 180 {
            self.size = Some(current.transposed());
        }
        Ok(())
    }

    async fn flip(&mut self, horizontal: bool, vertical: bool) -> Result<()> {
        self.loaded_size()?;
        if horizontal {
            self.transform(|img| img.fliph()).await?;
        }
        if vertical {
            self.transform(|img| img.flipv()).await?;
        }
        Ok(())
    }

    async fn stream(&mut self, mime_type: Option<&str>) -> Result<Bytes> {
        self.loaded_size()?;
        let format = self.output_format(mime_type, None)?;
        Ok(Bytes::from(self.encode(format).await?))
    }

    async fn save(
        &mut self,
        destination: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<ImageMetadata> {
        let size = self.loaded_size()?;

        let target = match destination.map(AssetLocation::resolve) {
            None => self.path.clone(),
            Some(AssetLocation::Local { path }) => path,
            Some(AssetLocation::Remote { url, .. }) => {
                return Err(ImagingError::Unsupported(format!(
                    "local editor cannot write to {}",
                    url
                )))
            }
        };

        let format = self.output_format(mime_type, Some(&target))?;
        let data = self.encode(format).await?;

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&target, &data).await?;

        debug!(path = ?target, bytes = data.len(), "Saved local image");

        Ok(ImageMetadata {
            file: target
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            width: size.width,
            height: size.height,
            mime_type: format.to_mime_type().to_string(),
        })
    }
}
