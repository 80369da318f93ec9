//! HTTP Client Abstraction
//!
//! The transport underneath the object store: `PUT` uploads, `HEAD`
//! existence probes and streamed `GET` downloads.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Head => "HEAD",
        }
    }
}

/// One request to the object store endpoint
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Head, url)
    }

    /// `PUT` of `body` tagged with its MIME type
    pub fn put(url: impl Into<String>, body: Bytes, mime_type: &str) -> Self {
        Self::new(HttpMethod::Put, url)
            .header("Content-Type", mime_type)
            .header("Content-Length", body.len().to_string())
            .with_body(body)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Throttling and server-side failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        is_retryable_status(self.status)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

/// How often and how patiently a request is retried
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Double the delay after every failed attempt
    pub exponential: bool,
}

impl RetryPolicy {
    /// A single attempt
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        if !self.exponential {
            return self.base_delay.min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            exponential: true,
        }
    }
}

/// Async HTTP client
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn object_exists(client: &dyn HttpClient, url: &str) -> Result<bool> {
///     Ok(client.execute(HttpRequest::head(url)).await?.is_success())
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute a request with the client's own retry policy.
    ///
    /// Non-2xx responses are returned as `Ok`; only transport failures
    /// and exhausted retries are errors.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Stream a `GET` response body without buffering it
    async fn download_stream(
        &self,
        url: String,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_request() {
        let request = HttpRequest::put(
            "https://store.example.com/media/a.jpg",
            Bytes::from_static(b"jpeg"),
            "image/jpeg",
        );

        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.headers.get("Content-Type").map(String::as_str), Some("image/jpeg"));
        assert_eq!(request.headers.get("Content-Length").map(String::as_str), Some("4"));
        assert_eq!(request.body.as_deref(), Some(&b"jpeg"[..]));
    }

    #[test]
    fn test_response_status_checks() {
        let response = HttpResponse {
            status: 404,
            headers: HashMap::from([("content-length".to_string(), "0".to_string())]),
            body: Bytes::new(),
        };

        assert!(!response.is_success());
        assert!(response.is_not_found());
        assert!(!response.is_retryable());
        assert_eq!(response.header("Content-Length"), Some("0"));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            exponential: true,
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(RetryPolicy::none().max_attempts, 1);
    }
}
