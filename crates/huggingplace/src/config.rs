//! Client configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use huggingplace_trace::{DEFAULT_BASE_URL, TraceConfig};
use serde::{Deserialize, Serialize};

use crate::error::{HuggingPlaceError, Result};

/// Default timeout for interaction-logging requests.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Environment an interaction is recorded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Prod,
    Dev,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Prod => "prod",
            Mode::Dev => "dev",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = HuggingPlaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "prod" => Ok(Mode::Prod),
            "dev" => Ok(Mode::Dev),
            _ => Err(HuggingPlaceError::Validation(
                "Mode must be either \"prod\" or \"dev\"".to_string(),
            )),
        }
    }
}

/// Configuration for a [`HuggingPlace`](crate::HuggingPlace) client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bearer credential for every request.
    pub api_key: String,

    /// Organization the interactions belong to.
    pub org_id: String,

    /// API base URL. Falls back to the hosted endpoint.
    pub base_url: Option<String>,

    pub mode: Mode,

    /// Interaction-logging request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Suppress client and sender diagnostics.
    pub silent: bool,

    /// Trace delivery settings for the owned sender.
    pub trace: TraceConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            org_id: String::new(),
            base_url: None,
            mode: Mode::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            silent: false,
            trace: TraceConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            org_id: org_id.into(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_trace(mut self, trace: TraceConfig) -> Self {
        self.trace = trace;
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Trace settings for the owned sender.
    ///
    /// An explicit client base URL wins over the trace default; the
    /// credential and silent flag always come from the client.
    pub fn trace_config(&self) -> TraceConfig {
        let mut trace = self.trace.clone();
        if self.base_url.is_some() && trace.base_url == DEFAULT_BASE_URL {
            trace.base_url = self.base_url().to_string();
        }
        trace.api_key = Some(self.api_key.clone());
        trace.silent = trace.silent || self.silent;
        trace
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(HuggingPlaceError::Validation(
                "API key is required".to_string(),
            ));
        }
        if self.org_id.trim().is_empty() {
            return Err(HuggingPlaceError::Validation(
                "Organization ID is required".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(HuggingPlaceError::Validation(
                "Timeout must be a positive number".to_string(),
            ));
        }
        self.trace_config().validate()?;
        Ok(())
    }

    /// Apply a partial update, leaving unset fields untouched.
    pub fn merged(&self, update: ConfigUpdate) -> Self {
        let mut config = self.clone();
        if let Some(api_key) = update.api_key {
            config.api_key = api_key;
        }
        if let Some(org_id) = update.org_id {
            config.org_id = org_id;
        }
        if let Some(base_url) = update.base_url {
            config.base_url = Some(base_url);
        }
        if let Some(mode) = update.mode {
            config.mode = mode;
        }
        if let Some(timeout) = update.timeout {
            config.timeout_ms = timeout.as_millis() as u64;
        }
        if let Some(silent) = update.silent {
            config.silent = silent;
        }
        if let Some(trace) = update.trace {
            config.trace = trace;
        }
        config
    }

    /// View of the configuration without the credential.
    pub fn redacted(&self) -> SafeConfig {
        let mut trace = self.trace.clone();
        trace.api_key = None;
        SafeConfig {
            org_id: self.org_id.clone(),
            base_url: self.base_url().to_string(),
            mode: self.mode,
            timeout_ms: self.timeout_ms,
            silent: self.silent,
            trace,
        }
    }
}

/// Partial configuration for [`HuggingPlace::update_config`](crate::HuggingPlace::update_config).
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub api_key: Option<String>,
    pub org_id: Option<String>,
    pub base_url: Option<String>,
    pub mode: Option<Mode>,
    pub timeout: Option<Duration>,
    pub silent: Option<bool>,
    pub trace: Option<TraceConfig>,
}

impl ConfigUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = Some(silent);
        self
    }

    pub fn trace(mut self, trace: TraceConfig) -> Self {
        self.trace = Some(trace);
        self
    }
}

/// Configuration as reported by [`HuggingPlace::config`](crate::HuggingPlace::config).
#[derive(Debug, Clone, Serialize)]
pub struct SafeConfig {
    pub org_id: String,
    pub base_url: String,
    pub mode: Mode,
    pub timeout_ms: u64,
    pub silent: bool,
    pub trace: TraceConfig,
}
