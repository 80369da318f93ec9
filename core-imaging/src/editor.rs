//! Editor capability shared by the local and remote editors.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use url::Url;

use crate::error::{ImagingError, Result};
use crate::geometry::{Rect, Size};
use core_runtime::config::DerivativeSizes;

pub const MIME_GIF: &str = "image/gif";
pub const MIME_JPEG: &str = "image/jpeg";

/// Where the pixel data of an asset lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetLocation {
    Local { path: PathBuf },
    Remote { url: String, scheme: String },
}

impl AssetLocation {
    /// Classify an asset reference.
    ///
    /// Anything with a URI scheme other than `file` is remote. Plain paths,
    /// `file://` URLs and Windows drive paths (`C:\...`) are local.
    pub fn resolve(reference: &str) -> Self {
        match Url::parse(reference) {
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .unwrap_or_else(|_| PathBuf::from(url.path()));
                AssetLocation::Local { path }
            }
            // A one-letter scheme is a drive letter
            Ok(url) if url.scheme().len() > 1 => AssetLocation::Remote {
                scheme: url.scheme().to_string(),
                url: reference.to_string(),
            },
            _ => AssetLocation::Local {
                path: PathBuf::from(reference),
            },
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, AssetLocation::Remote { .. })
    }

    /// Last path segment of the reference
    pub fn file_name(&self) -> String {
        match self {
            AssetLocation::Local { path } => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            AssetLocation::Remote { url, .. } => Url::parse(url)
                .ok()
                .and_then(|u| {
                    u.path_segments()
                        .and_then(|mut segments| segments.next_back().map(str::to_string))
                })
                .unwrap_or_default(),
        }
    }
}

/// Dimensions and identity of a saved (or planned) image.
///
/// `file` is a bare file name, never a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub file: String,
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
}

/// One generated derivative
pub type DerivativeResult = ImageMetadata;

/// Mime recorded for generated metadata: GIF stays GIF, everything else is
/// reported as JPEG.
pub fn metadata_mime(animated: bool) -> &'static str {
    if animated {
        MIME_GIF
    } else {
        MIME_JPEG
    }
}

/// Pixel editor for one asset.
///
/// Implementations must be loaded before any other call; until then
/// `current_size` is `None` and edits fail with [`ImagingError::NotLoaded`].
#[async_trait]
pub trait ImageEditor: Send + Sync {
    fn location(&self) -> &AssetLocation;

    /// Read dimensions and format of the asset
    async fn load(&mut self) -> Result<()>;

    fn current_size(&self) -> Option<Size>;

    /// True for formats that may carry animation (GIF)
    fn is_animated_format(&self) -> bool;

    fn mime_type(&self) -> &str;

    /// Scale to fit within the bounds, or cover-crop to exactly
    /// `(max_w, max_h)` when `crop` is set
    async fn resize(&mut self, max_w: Option<u32>, max_h: Option<u32>, crop: bool) -> Result<()>;

    /// Extract `source` and scale it to `target`
    async fn crop(&mut self, source: Rect, target: Size) -> Result<()>;

    /// Rotate counter-clockwise by a multiple of 90 degrees
    async fn rotate(&mut self, degrees: i32) -> Result<()>;

    async fn flip(&mut self, horizontal: bool, vertical: bool) -> Result<()>;

    /// Encode the current pixels
    async fn stream(&mut self, mime_type: Option<&str>) -> Result<Bytes>;

    /// Write the current pixels to `destination` (the source when `None`)
    async fn save(
        &mut self,
        destination: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<ImageMetadata>;

    /// Produce all derivatives in one step, if the editor has such a
    /// primitive
    async fn multi_resize(
        &mut self,
        sizes: &DerivativeSizes,
    ) -> Result<BTreeMap<String, DerivativeResult>> {
        let _ = sizes;
        Err(ImagingError::Unsupported(
            "editor has no multi-size primitive".to_string(),
        ))
    }
}

/// Normalize a counter-clockwise angle to 0, 90, 180 or 270
pub(crate) fn quarter_turns(degrees: i32) -> Result<i32> {
    let normalized = degrees.rem_euclid(360);
    if normalized % 90 != 0 {
        return Err(ImagingError::Unsupported(format!(
            "rotation by {} degrees",
            degrees
        )));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_plain_path_is_local() {
        assert_eq!(
            AssetLocation::resolve("/srv/uploads/2024/05/photo.jpg"),
            AssetLocation::Local {
                path: PathBuf::from("/srv/uploads/2024/05/photo.jpg")
            }
        );
        assert!(!AssetLocation::resolve("relative/photo.jpg").is_remote());
    }

    #[test]
    fn test_resolve_file_url_is_local() {
        assert_eq!(
            AssetLocation::resolve("file:///srv/uploads/photo.jpg"),
            AssetLocation::Local {
                path: PathBuf::from("/srv/uploads/photo.jpg")
            }
        );
    }

    #[test]
    fn test_resolve_drive_letter_is_local() {
        assert!(!AssetLocation::resolve("C:\\media\\photo.jpg").is_remote());
    }

    #[test]
    fn test_resolve_other_schemes_are_remote() {
        match AssetLocation::resolve("https://cdn.example.com/media/photo.jpg") {
            AssetLocation::Remote { url, scheme } => {
                assert_eq!(scheme, "https");
                assert_eq!(url, "https://cdn.example.com/media/photo.jpg");
            }
            other => panic!("expected remote, got {:?}", other),
        }
        assert!(AssetLocation::resolve("s3://bucket/photo.jpg").is_remote());
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            AssetLocation::resolve("https://cdn.example.com/media/2024/photo.jpg").file_name(),
            "photo.jpg"
        );
        assert_eq!(
            AssetLocation::resolve("/srv/uploads/photo.png").file_name(),
            "photo.png"
        );
    }

    #[test]
    fn test_quarter_turns() {
        assert_eq!(quarter_turns(90).unwrap(), 90);
        assert_eq!(quarter_turns(-90).unwrap(), 270);
        assert_eq!(quarter_turns(720).unwrap(), 0);
        assert!(matches!(
            quarter_turns(45),
            Err(ImagingError::Unsupported(_))
        ));
    }

    #[test]
    fn test_metadata_mime() {
        assert_eq!(metadata_mime(true), "image/gif");
        assert_eq!(metadata_mime(false), "image/jpeg");
    }
}
