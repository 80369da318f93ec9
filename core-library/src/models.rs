//! Domain models for the media catalog
//!
//! Catalog rows are read-only to the migration core except for the metadata
//! document, which the import, regenerate and unlink runs rewrite.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// ID Types
// =============================================================================

/// Unique identifier for a catalog item
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Catalog Item
// =============================================================================

/// An uploaded media attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CatalogItem {
    pub id: ItemId,
    /// File path relative to the upload root, e.g. `2024/05/photo.jpg`
    pub attached_file: String,
    pub mime_type: String,
    /// Public URL of the original
    pub guid: String,
}

impl CatalogItem {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Basename of the attached file
    pub fn file_name(&self) -> &str {
        self.attached_file
            .rsplit('/')
            .next()
            .unwrap_or(&self.attached_file)
    }

    /// Directory part of the attached file (empty for top-level files)
    pub fn directory(&self) -> &str {
        match self.attached_file.rfind('/') {
            Some(idx) => &self.attached_file[..idx],
            None => "",
        }
    }
}

/// Values for inserting a new catalog item
#[derive(Debug, Clone)]
pub struct NewCatalogItem {
    pub attached_file: String,
    pub mime_type: String,
    pub guid: String,
}

impl NewCatalogItem {
    pub fn new(
        attached_file: impl Into<String>,
        mime_type: impl Into<String>,
        guid: impl Into<String>,
    ) -> Self {
        Self {
            attached_file: attached_file.into(),
            mime_type: mime_type.into(),
            guid: guid.into(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.attached_file.trim().is_empty() {
            return Err("Attached file cannot be empty".to_string());
        }
        if self.attached_file.starts_with('/') {
            return Err("Attached file must be relative to the upload root".to_string());
        }
        if !self.mime_type.contains('/') {
            return Err(format!("Invalid mime type: {}", self.mime_type));
        }
        Ok(())
    }
}

// =============================================================================
// Metadata Document
// =============================================================================

/// Marks an original or derivative as living in remote storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMarker {
    pub provider: String,
    pub bucket: String,
    pub key: String,
    pub url: String,
    pub mime_type: String,
}

/// Metadata of one named derivative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeMetadata {
    /// File name, stored next to the original
    pub file: String,
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteMarker>,
}

/// Per-item metadata document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMetadata {
    /// Attached file path relative to the upload root
    pub file: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteMarker>,
    #[serde(default)]
    pub sizes: BTreeMap<String, DerivativeMetadata>,
}

impl AttachmentMetadata {
    pub fn new(file: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            file: file.into(),
            width,
            height,
            ..Self::default()
        }
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// True if the original or any derivative carries a remote marker
    pub fn has_remote_markers(&self) -> bool {
        self.is_remote() || self.sizes.values().any(|size| size.remote.is_some())
    }

    /// Remove the remote marker from the original and every derivative.
    ///
    /// Derivative markers are only touched when the original itself is
    /// marked; otherwise nothing changes. Returns whether anything was
    /// removed.
    pub fn strip_remote_markers(&mut self) -> bool {
        if self.remote.take().is_none() {
            return false;
        }
        for size in self.sizes.values_mut() {
            size.remote = None;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(key: &str) -> RemoteMarker {
        RemoteMarker {
            provider: "s3".to_string(),
            bucket: "media".to_string(),
            key: key.to_string(),
            url: format!("https://store.example.com/media/{}", key),
            mime_type: "image/jpeg".to_string(),
        }
    }

    #[test]
    fn test_catalog_item_path_parts() {
        let item = CatalogItem {
            id: ItemId(1),
            attached_file: "2024/05/photo.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            guid: "https://example.com/uploads/2024/05/photo.jpg".to_string(),
        };

        assert!(item.is_image());
        assert_eq!(item.file_name(), "photo.jpg");
        assert_eq!(item.directory(), "2024/05");

        let top = CatalogItem {
            attached_file: "photo.jpg".to_string(),
            ..item
        };
        assert_eq!(top.directory(), "");
        assert_eq!(top.file_name(), "photo.jpg");
    }

    #[test]
    fn test_new_item_validation() {
        assert!(NewCatalogItem::new("a/b.jpg", "image/jpeg", "u").validate().is_ok());
        assert!(NewCatalogItem::new("", "image/jpeg", "u").validate().is_err());
        assert!(NewCatalogItem::new("/abs/b.jpg", "image/jpeg", "u").validate().is_err());
        assert!(NewCatalogItem::new("a/b.jpg", "jpeg", "u").validate().is_err());
    }

    #[test]
    fn test_strip_remote_markers() {
        let mut metadata = AttachmentMetadata::new("2024/05/photo.jpg", 800, 600);
        metadata.remote = Some(marker("2024/05/photo.jpg"));
        metadata.sizes.insert(
            "thumbnail".to_string(),
            DerivativeMetadata {
                file: "photo-150x150.jpg".to_string(),
                width: 150,
                height: 150,
                mime_type: "image/jpeg".to_string(),
                remote: Some(marker("2024/05/photo-150x150.jpg")),
            },
        );

        assert!(metadata.has_remote_markers());
        assert!(metadata.strip_remote_markers());
        assert!(!metadata.has_remote_markers());
        assert!(!metadata.strip_remote_markers());
        assert_eq!(metadata.sizes["thumbnail"].width, 150);
    }

    #[test]
    fn test_strip_leaves_derivatives_of_unmarked_original() {
        let mut metadata = AttachmentMetadata::new("2024/05/photo.jpg", 800, 600);
        metadata.sizes.insert(
            "thumbnail".to_string(),
            DerivativeMetadata {
                file: "photo-150x150.jpg".to_string(),
                width: 150,
                height: 150,
                mime_type: "image/jpeg".to_string(),
                remote: Some(marker("2024/05/photo-150x150.jpg")),
            },
        );

        assert!(!metadata.strip_remote_markers());
        assert!(metadata.sizes["thumbnail"].remote.is_some());
    }

    #[test]
    fn test_metadata_json_omits_absent_markers() {
        let metadata = AttachmentMetadata::new("photo.jpg", 10, 20);
        let json = serde_json::to_value(&metadata).unwrap();

        assert!(json.get("remote").is_none());
        assert_eq!(json["width"], 10);

        let parsed: AttachmentMetadata =
            serde_json::from_str(r#"{"file":"a.jpg","width":1,"height":2}"#).unwrap();
        assert!(parsed.sizes.is_empty());
        assert!(parsed.remote.is_none());
    }
}
