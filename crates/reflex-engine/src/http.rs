//! reqwest-backed [`HttpClient`].

use async_trait::async_trait;
use reflex_core::error::{ReflexError, Result};
use reflex_core::traits::{HttpClient, HttpRequest, HttpResponse};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn request(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| ReflexError::Network(format!("invalid method {}: {e}", request.method)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ReflexError::Timeout(request.timeout.as_millis() as u64)
            } else {
                ReflexError::Network(format!("HTTP request failed: {e}"))
            }
        })?;

        // A status line means the call happened; a broken body must not make it retryable.
        let status = response.status().as_u16();
        let body = match response.bytes().await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(url = %request.url, status, error = %e, "Failed to read response body");
                String::new()
            }
        };

        Ok(HttpResponse { status, body })
    }
}
