//! # Core Configuration Module
//!
//! Provides configuration management for the media cloud core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`MediaCloudConfig`] holding everything a migration run needs: where the
//! catalog database lives, where local uploads are rooted, which remote
//! storage backend to talk to and which derivative sizes to generate. The
//! builder validates eagerly so that misconfiguration fails before any item
//! is touched.
//!
//! ## Required Settings
//!
//! - `database_path` - SQLite catalog database
//! - `upload_root` - Directory that catalog file paths are relative to
//!
//! ## Optional Settings (with defaults)
//!
//! - `scratch_dir` - Where remote originals are fetched to (`<cache>/mediacloud/scratch`)
//! - `storage` - Remote backend settings (disabled by default)
//! - `derivative_sizes` - Named derivative table (WordPress-style defaults)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{MediaCloudConfig, StorageSettings};
//!
//! let config = MediaCloudConfig::builder()
//!     .database_path("/srv/media/catalog.db")
//!     .upload_root("/srv/media/uploads")
//!     .storage(StorageSettings::enabled("https://s3.example.com", "media"))
//!     .build()?;
//! ```
//!
//! A JSON file can supply the same settings (see [`ConfigFile`]):
//!
//! ```json
//! {
//!   "upload_root": "/srv/media/uploads",
//!   "storage": { "enabled": true, "endpoint": "https://s3.example.com", "bucket": "media" },
//!   "sizes": { "thumbnail": { "width": 150, "height": 150, "crop": true } }
//! }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Requested geometry for one named derivative.
///
/// An unset axis is unconstrained; an unset `crop` means "fit, don't crop".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<bool>,
}

impl DerivativeSpec {
    pub fn fit(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            crop: None,
        }
    }

    pub fn cropped(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            crop: Some(true),
        }
    }

    /// Constrain the width only
    pub fn width_only(width: u32) -> Self {
        Self {
            width: Some(width),
            height: None,
            crop: None,
        }
    }

    /// Both axes unset; such specs are skipped during generation.
    pub fn is_unbounded(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }

    pub fn wants_crop(&self) -> bool {
        self.crop.unwrap_or(false)
    }
}

/// Named derivative table, keyed by size name.
pub type DerivativeSizes = BTreeMap<String, DerivativeSpec>;

/// Default derivative table: `thumbnail` 150x150 cropped, `medium` 300x300,
/// `medium_large` 768 wide, `large` 1024x1024.
pub fn default_derivative_sizes() -> DerivativeSizes {
    let mut sizes = DerivativeSizes::new();
    sizes.insert("thumbnail".to_string(), DerivativeSpec::cropped(150, 150));
    sizes.insert("medium".to_string(), DerivativeSpec::fit(300, 300));
    sizes.insert("medium_large".to_string(), DerivativeSpec::width_only(768));
    sizes.insert("large".to_string(), DerivativeSpec::fit(1024, 1024));
    sizes
}

/// Remote storage backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Administrative switch; import/regenerate require it on, unlink off
    pub enabled: bool,
    /// Provider name recorded in remote markers
    pub provider: String,
    /// Base URL of the S3-compatible endpoint
    pub endpoint: Option<String>,
    pub bucket: String,
    /// Key prefix inside the bucket
    pub prefix: String,
    /// Also migrate non-image attachments
    pub upload_documents: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "s3".to_string(),
            endpoint: None,
            bucket: String::new(),
            prefix: String::new(),
            upload_documents: false,
        }
    }
}

impl StorageSettings {
    /// Enabled settings for `endpoint`/`bucket` with defaults elsewhere
    pub fn enabled(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            enabled: true,
            endpoint: Some(endpoint.into()),
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        match self.endpoint.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(Error::Config(
                    "Storage is enabled but no endpoint is configured".to_string(),
                ))
            }
            _ => {}
        }

        if self.bucket.trim().is_empty() {
            return Err(Error::Config(
                "Storage is enabled but no bucket is configured".to_string(),
            ));
        }

        if self.provider.trim().is_empty() {
            return Err(Error::Config("Storage provider cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// On-disk configuration file (JSON). Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub database_path: Option<PathBuf>,
    pub upload_root: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub storage: Option<StorageSettings>,
    /// Replaces the default derivative table when present
    #[serde(default)]
    pub sizes: Option<DerivativeSizes>,
}

impl ConfigFile {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ConfigFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }
}

/// Validated configuration for the media cloud core.
///
/// Use [`MediaCloudConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct MediaCloudConfig {
    /// Path to the SQLite catalog database
    pub database_path: PathBuf,

    /// Root directory catalog file paths are relative to
    pub upload_root: PathBuf,

    /// Scratch directory for fetched remote originals
    pub scratch_dir: PathBuf,

    pub storage: StorageSettings,

    pub derivative_sizes: DerivativeSizes,
}

impl MediaCloudConfig {
    pub fn builder() -> MediaCloudConfigBuilder {
        MediaCloudConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.upload_root.as_os_str().is_empty() {
            return Err(Error::Config("Upload root cannot be empty".to_string()));
        }

        if self.scratch_dir.as_os_str().is_empty() {
            return Err(Error::Config("Scratch directory cannot be empty".to_string()));
        }

        self.storage.validate()?;

        if let Some((name, _)) = self
            .derivative_sizes
            .iter()
            .find(|(_, spec)| spec.width == Some(0) || spec.height == Some(0))
        {
            return Err(Error::Config(format!(
                "Derivative size '{}' has a zero dimension",
                name
            )));
        }

        Ok(())
    }
}

fn default_scratch_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("mediacloud")
        .join("scratch")
}

/// Builder for constructing [`MediaCloudConfig`] instances.
#[derive(Debug, Default)]
pub struct MediaCloudConfigBuilder {
    database_path: Option<PathBuf>,
    upload_root: Option<PathBuf>,
    scratch_dir: Option<PathBuf>,
    storage: Option<StorageSettings>,
    derivative_sizes: Option<DerivativeSizes>,
}

impl MediaCloudConfigBuilder {
    /// Sets the catalog database path.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the directory catalog file paths are resolved against.
    pub fn upload_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.upload_root = Some(path.into());
        self
    }

    /// Sets the scratch directory for remote fetches.
    ///
    /// Default: `<platform cache>/mediacloud/scratch`
    pub fn scratch_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.scratch_dir = Some(path.into());
        self
    }

    pub fn storage(mut self, storage: StorageSettings) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Replaces the whole derivative table.
    pub fn derivative_sizes(mut self, sizes: DerivativeSizes) -> Self {
        self.derivative_sizes = Some(sizes);
        self
    }

    /// Adds or replaces a single named derivative size.
    pub fn derivative_size(mut self, name: impl Into<String>, spec: DerivativeSpec) -> Self {
        self.derivative_sizes
            .get_or_insert_with(default_derivative_sizes)
            .insert(name.into(), spec);
        self
    }

    /// Layers values from a configuration file under anything already set
    /// explicitly on the builder.
    pub fn merge_file(mut self, file: ConfigFile) -> Self {
        if self.database_path.is_none() {
            self.database_path = file.database_path;
        }
        if self.upload_root.is_none() {
            self.upload_root = file.upload_root;
        }
        if self.scratch_dir.is_none() {
            self.scratch_dir = file.scratch_dir;
        }
        if self.storage.is_none() {
            self.storage = file.storage;
        }
        if self.derivative_sizes.is_none() {
            self.derivative_sizes = file.sizes;
        }
        self
    }

    /// Builds the final [`MediaCloudConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required path is missing or any value
    /// fails validation.
    pub fn build(self) -> Result<MediaCloudConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let upload_root = self.upload_root.ok_or_else(|| {
            Error::Config("Upload root is required. Use .upload_root() to set it.".to_string())
        })?;

        let config = MediaCloudConfig {
            database_path,
            upload_root,
            scratch_dir: self.scratch_dir.unwrap_or_else(default_scratch_dir),
            storage: self.storage.unwrap_or_default(),
            derivative_sizes: self
                .derivative_sizes
                .unwrap_or_else(default_derivative_sizes),
        };

        config.validate()?;

        Ok(config)
    }
}
