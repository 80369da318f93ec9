//! Object Store Implementation over HTTP
//!
//! Talks to an S3-compatible endpoint with path-style addressing:
//! `{endpoint}/{bucket}/{prefix}{key}`. Request signing is left to a proxy or
//! a pre-authorized endpoint.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpRequest},
    storage::{ObjectStore, StoredObject},
};
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

/// [`ObjectStore`] backed by an [`HttpClient`]
pub struct HttpObjectStore {
    http: Arc<dyn HttpClient>,
    provider: String,
    endpoint: String,
    bucket: String,
    prefix: String,
}

impl HttpObjectStore {
    /// Create a store rooted at `endpoint/bucket`
    ///
    /// # Errors
    ///
    /// Returns `NotAvailable` when the endpoint is not an absolute http(s) URL
    /// or the bucket name is empty.
    pub fn new(
        http: Arc<dyn HttpClient>,
        provider: impl Into<String>,
        endpoint: &str,
        bucket: impl Into<String>,
    ) -> Result<Self> {
        let parsed = Url::parse(endpoint)
            .map_err(|e| BridgeError::NotAvailable(format!("Invalid endpoint {}: {}", endpoint, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BridgeError::NotAvailable(format!(
                "Unsupported endpoint scheme: {}",
                parsed.scheme()
            )));
        }

        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            return Err(BridgeError::NotAvailable("Bucket name is empty".to_string()));
        }

        Ok(Self {
            http,
            provider: provider.into(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket,
            prefix: String::new(),
        })
    }

    /// Prefix prepended to every key, e.g. `uploads/`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_matches('/');
        self.prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        };
        self
    }

    fn base_url(&self) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, self.prefix)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}{}", self.base_url(), key.trim_start_matches('/'))
    }

    fn key_for(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.base_url())
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let response = self
            .http
            .execute(HttpRequest::head(self.url_for(key)))
            .await?;

        if response.is_success() {
            Ok(true)
        } else if response.is_not_found() {
            Ok(false)
        } else {
            Err(BridgeError::OperationFailed(format!(
                "HEAD {} returned {}",
                key, response.status
            )))
        }
    }

    async fn upload(&self, key: &str, data: Bytes, mime_type: &str) -> Result<StoredObject> {
        let url = self.url_for(key);
        let size = data.len() as u64;
        let response = self
            .http
            .execute(HttpRequest::put(url.clone(), data, mime_type))
            .await?;
        if !response.is_success() {
            return Err(BridgeError::OperationFailed(format!(
                "Upload of {} failed with HTTP {}",
                key, response.status
            )));
        }

        info!(key, size, bucket = %self.bucket, "Uploaded object");
        Ok(StoredObject {
            key: key.trim_start_matches('/').to_string(),
            url,
            size,
        })
    }

    /// Streams into a temporary sibling of `destination` that is renamed
    /// into place only once the body is complete. A failed transfer leaves
    /// nothing behind.
    async fn download_to(&self, url: &str, destination: &Path) -> Result<u64> {
        let mut reader = self.http.download_stream(url.to_string()).await?;

        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        tokio::fs::create_dir_all(parent).await?;

        let (file, partial) = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(parent)?
            .into_parts();
        let mut file = tokio::fs::File::from_std(file);
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        drop(file);

        partial
            .persist(destination)
            .map_err(|e| BridgeError::Io(e.error))?;

        debug!(url, path = ?destination, bytes = written, "Downloaded object");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::http::{HttpMethod, HttpResponse};
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
            async fn download_stream(&self, url: String) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
        }
    }

    fn response(status: u16) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    fn store(http: MockHttp) -> HttpObjectStore {
        HttpObjectStore::new(Arc::new(http), "s3", "https://store.example.com/", "media")
            .unwrap()
            .with_prefix("/uploads/")
    }

    #[test]
    fn test_url_and_key_mapping() {
        let store = store(MockHttp::new());

        let url = store.url_for("2024/05/photo.jpg");
        assert_eq!(url, "https://store.example.com/media/uploads/2024/05/photo.jpg");
        assert_eq!(store.key_for(&url).as_deref(), Some("2024/05/photo.jpg"));
        assert_eq!(store.key_for("https://elsewhere.example.com/photo.jpg"), None);
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let http: Arc<dyn HttpClient> = Arc::new(MockHttp::new());
        assert!(HttpObjectStore::new(http.clone(), "s3", "not a url", "media").is_err());
        assert!(HttpObjectStore::new(http.clone(), "s3", "ftp://host", "media").is_err());
        assert!(HttpObjectStore::new(http, "s3", "https://host", " ").is_err());
    }

    #[tokio::test]
    async fn test_upload_puts_with_content_type() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| {
                req.method == HttpMethod::Put
                    && req.url == "https://store.example.com/media/uploads/a.jpg"
                    && req.headers.get("Content-Type").map(String::as_str) == Some("image/jpeg")
            })
            .times(1)
            .returning(|_| Ok(response(200)));

        let stored = store(http)
            .upload("a.jpg", Bytes::from_static(b"abc"), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(stored.key, "a.jpg");
        assert_eq!(stored.size, 3);
    }

    #[tokio::test]
    async fn test_upload_failure_is_an_error() {
        let mut http = MockHttp::new();
        http.expect_execute().returning(|_| Ok(response(403)));

        let result = store(http)
            .upload("a.jpg", Bytes::from_static(b"abc"), "image/jpeg")
            .await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }

    #[tokio::test]
    async fn test_exists_maps_status_codes() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| req.url.ends_with("/present.jpg"))
            .returning(|_| Ok(response(200)));
        http.expect_execute()
            .withf(|req| req.url.ends_with("/absent.jpg"))
            .returning(|_| Ok(response(404)));

        let store = store(http);
        assert!(store.exists("present.jpg").await.unwrap());
        assert!(!store.exists("absent.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_download_to_writes_file() {
        let mut http = MockHttp::new();
        http.expect_download_stream().returning(|_| {
            let reader: Box<dyn tokio::io::AsyncRead + Send + Unpin> =
                Box::new(std::io::Cursor::new(b"pixels".to_vec()));
            Ok(reader)
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/photo.jpg");
        let written = store(http)
            .download_to("https://store.example.com/media/uploads/photo.jpg", &dest)
            .await
            .unwrap();

        assert_eq!(written, 6);
        assert_eq!(std::fs::read(&dest).unwrap(), b"pixels");
    }

    /// Reader that fails every poll, as a dropped connection does
    struct ResetReader;

    impl tokio::io::AsyncRead for ResetReader {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::ErrorKind::ConnectionReset.into()))
        }
    }

    #[tokio::test]
    async fn test_interrupted_download_leaves_no_file() {
        use tokio::io::AsyncReadExt;

        let mut http = MockHttp::new();
        http.expect_download_stream().returning(|_| {
            let reader: Box<dyn tokio::io::AsyncRead + Send + Unpin> =
                Box::new(std::io::Cursor::new(b"twelve bytes".to_vec()).chain(ResetReader));
            Ok(reader)
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("photo.jpg");
        let result = store(http)
            .download_to("https://store.example.com/media/uploads/photo.jpg", &dest)
            .await;

        assert!(result.is_err());
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
