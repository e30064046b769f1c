//! Network seam for trace delivery.
//!
//! The sender only ever POSTs pre-serialized JSON bytes, so retries resend
//! exactly the same payload.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::config::TraceConfig;
use crate::error::{Result, TraceError};

/// Status code the collector returns for accepted traces.
pub const STATUS_CREATED: u16 = 201;

/// Raw response from the collector.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Parse the body as JSON, if it is JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Something that can POST a JSON payload.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `body` to `url`. Any response, whatever its status, is `Ok`;
    /// only transport-level failures are `Err`.
    async fn post(&self, url: &str, body: Bytes, timeout: Duration) -> Result<TransportResponse>;
}

/// Shared transport handle.
pub type SharedTransport = Arc<dyn Transport>;

/// Transport backed by a `reqwest` client with the auth headers preinstalled.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a client carrying `Content-Type`, `Authorization` and any extra headers.
    pub fn new(config: &TraceConfig) -> Result<Self> {
        let headers = default_headers(config.api_key.as_deref(), &config.headers)?;
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| TraceError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client. Headers are the caller's responsibility.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Build the header set attached to every collector request.
pub fn default_headers<'a>(
    api_key: Option<&str>,
    extra: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TraceError::Config(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TraceError::Config(format!("Invalid value for header '{}': {}", name, e)))?;
        headers.insert(name, value);
    }

    if let Some(key) = api_key {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", key))
            .map_err(|_| TraceError::Config("API key is not a valid header value".to_string()))?;
        value.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, value);
    }

    Ok(headers)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: Bytes, timeout: Duration) -> Result<TransportResponse> {
        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(TransportResponse { status, body })
    }
}
