//! Sender configuration.
//!
//! Durations are kept in milliseconds so the config maps directly onto a
//! `[trace]` table in a TOML file.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};

/// Default collector base URL.
pub const DEFAULT_BASE_URL: &str = "https://anvsj57nul.execute-api.ap-south-1.amazonaws.com";

/// Configuration for a [`BatchSender`](crate::BatchSender).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Collector base URL; endpoints are derived from it.
    pub base_url: String,

    /// Records per batch. Values of 0 or 1 disable batching.
    pub batch_size: usize,

    /// How long a partial batch may wait before it is flushed.
    pub batch_timeout_ms: u64,

    /// Retries after the first failed attempt.
    pub max_retries: u32,

    /// Base backoff; attempt `n` waits `retry_delay_ms * 2^n`.
    pub retry_delay_ms: u64,

    /// Timeout for a single-record request.
    pub request_timeout_ms: u64,

    /// Timeout for a batch request.
    pub batch_request_timeout_ms: u64,

    /// Suppress delivery diagnostics.
    pub silent: bool,

    /// Extra headers sent with every request.
    pub headers: HashMap<String, String>,

    /// Bearer credential. Never serialized.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            batch_size: 10,
            batch_timeout_ms: 5_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            request_timeout_ms: 10_000,
            batch_request_timeout_ms: 30_000,
            silent: false,
            headers: HashMap::new(),
            api_key: None,
        }
    }
}

/// Collector endpoints derived from a base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEndpoints {
    pub trace: String,
    pub batch: String,
}

impl TraceEndpoints {
    pub fn new(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            trace: format!("{base}/api/traces"),
            batch: format!("{base}/api/traces/batch"),
        }
    }
}

impl TraceConfig {
    /// Set the collector base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the bearer credential.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the partial-batch flush timeout.
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set max retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the single-record request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the batch request timeout.
    pub fn with_batch_request_timeout(mut self, timeout: Duration) -> Self {
        self.batch_request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Enable or disable silent mode.
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Add an extra request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn batch_request_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_request_timeout_ms)
    }

    /// Whether records are buffered rather than sent one by one.
    pub fn batching_enabled(&self) -> bool {
        self.batch_size > 1
    }

    pub fn endpoints(&self) -> TraceEndpoints {
        TraceEndpoints::new(&self.base_url)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(TraceError::Validation("base_url cannot be empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(TraceError::Validation(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.request_timeout_ms == 0 || self.batch_request_timeout_ms == 0 {
            return Err(TraceError::Validation(
                "request timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
