//! Reqwest-backed [`HttpClient`]

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{is_retryable_status, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("mediacloud/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the object store endpoint
///
/// Transport failures, `429` and `5xx` responses are retried according to
/// the client's [`RetryPolicy`]; the last failure is returned once attempts
/// run out.
pub struct ReqwestHttpClient {
    client: Client,
    policy: RetryPolicy,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(120))
    }

    /// Client whose requests give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("HTTP client unavailable: {}", e)))?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    /// One attempt. `Ok(None)` means a retryable status came back.
    async fn attempt(&self, request: &HttpRequest) -> Result<Option<HttpResponse>> {
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| transport_error(&request.url, e))?;
        let status = response.status().as_u16();
        if is_retryable_status(status) {
            warn!(status, url = %request.url, "Retryable HTTP status");
            return Ok(None);
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&request.url, e))?;

        Ok(Some(HttpResponse {
            status,
            headers,
            body,
        }))
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> BridgeError {
    if err.is_timeout() {
        BridgeError::OperationFailed(format!("Request to {} timed out", url))
    } else if err.is_connect() {
        BridgeError::OperationFailed(format!("Cannot connect to {}: {}", url, err))
    } else {
        BridgeError::OperationFailed(format!("{}: {}", url, err))
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!(attempt, attempts, method = request.method.as_str(), url = %request.url, "HTTP request");

            match self.attempt(&request).await {
                Ok(Some(response)) => return Ok(response),
                Ok(None) => {
                    last_error = Some(BridgeError::OperationFailed(format!(
                        "{} {} kept failing on the server side",
                        request.method.as_str(),
                        request.url
                    )));
                }
                Err(e) => {
                    warn!(error = %e, attempt, "HTTP attempt failed");
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                sleep(self.policy.delay_for(attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BridgeError::OperationFailed(format!("No attempt made for {}", request.url))
        }))
    }

    async fn download_stream(
        &self,
        url: String,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BridgeError::NotFound(url));
        }
        if !status.is_success() {
            return Err(BridgeError::OperationFailed(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(tokio_util::io::StreamReader::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds() {
        let client = ReqwestHttpClient::new()
            .unwrap()
            .with_retry_policy(RetryPolicy::none());
        assert_eq!(client.policy.max_attempts, 1);
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(ReqwestHttpClient::method(HttpMethod::Put), reqwest::Method::PUT);
        assert_eq!(ReqwestHttpClient::method(HttpMethod::Head), reqwest::Method::HEAD);
        assert_eq!(ReqwestHttpClient::method(HttpMethod::Get), reqwest::Method::GET);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        let client = ReqwestHttpClient::with_timeout(Duration::from_secs(2))
            .unwrap()
            .with_retry_policy(RetryPolicy::none());

        let result = client
            .execute(HttpRequest::head("http://127.0.0.1:9/missing.jpg"))
            .await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }
}
