//! Fakes shared by the unit tests of this crate

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::storage::{ObjectStore, StoredObject};
use bytes::Bytes;
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const BASE: &str = "https://cdn.example.com/media";

/// Write a solid PNG of the given size
pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    RgbImage::new(width, height)
        .save_with_format(&path, ImageFormat::Png)
        .unwrap();
    path
}

/// Object store that serves one generated image and records uploads
pub struct FakeStore {
    width: u32,
    height: u32,
    pub downloads: AtomicUsize,
    pub uploads: Mutex<Vec<(String, usize, String)>>,
}

impl FakeStore {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            downloads: AtomicUsize::new(0),
            uploads: Mutex::new(Vec::new()),
        })
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _, _)| key.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    fn provider(&self) -> &str {
        "s3"
    }

    fn bucket(&self) -> &str {
        "media"
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", BASE, key)
    }

    fn key_for(&self, url: &str) -> Option<String> {
        url.strip_prefix(BASE)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_string)
    }

    async fn exists(&self, _key: &str) -> Result<bool> {
        Ok(true)
    }

    async fn upload(&self, key: &str, data: Bytes, mime_type: &str) -> Result<StoredObject> {
        self.uploads
            .lock()
            .unwrap()
            .push((key.to_string(), data.len(), mime_type.to_string()));
        Ok(StoredObject {
            key: key.to_string(),
            url: self.url_for(key),
            size: data.len() as u64,
        })
    }

    async fn download_to(&self, _url: &str, destination: &Path) -> Result<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        RgbImage::new(self.width, self.height)
            .save_with_format(destination, ImageFormat::Png)
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;
        Ok(std::fs::metadata(destination)?.len())
    }
}
