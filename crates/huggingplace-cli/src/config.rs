//! Configuration file support for the CLI.
//!
//! Config discovery searches for `.huggingplace/config.toml` starting from the
//! current directory and walking up to parent directories. Command-line flags
//! and `HUGGINGPLACE_*` environment variables override file values.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use huggingplace::trace::TraceConfig;
use huggingplace::{ClientConfig, Mode};
use serde::Deserialize;

/// The HuggingPlace data directory name.
pub const HUGGINGPLACE_DIR: &str = ".huggingplace";
/// The config file name within the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Contents of `.huggingplace/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub api_key: Option<String>,
    pub org_id: Option<String>,
    pub base_url: Option<String>,
    pub mode: Option<Mode>,
    /// Request timeout in milliseconds.
    pub timeout: Option<u64>,
    pub silent: Option<bool>,
    pub trace: Option<TraceConfig>,
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub org_id: Option<String>,
    pub base_url: Option<String>,
    pub mode: Option<Mode>,
    pub timeout: Option<u64>,
    pub silent: bool,
}

impl FileConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load an explicit path: either a `.huggingplace` directory or the file itself.
    pub fn from_path(path: &Path) -> Result<Self> {
        if path.is_dir() {
            Self::from_file(&path.join(CONFIG_FILE))
        } else {
            Self::from_file(path)
        }
    }

    /// Find and load configuration from current or parent directories.
    pub fn find_and_load() -> Result<Option<(Self, PathBuf)>> {
        let current = std::env::current_dir()?;
        Self::find_and_load_from(&current)
    }

    /// Find and load configuration starting from a specific directory.
    ///
    /// Returns the config and the path of the file it came from.
    pub fn find_and_load_from(start: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start.to_path_buf();

        loop {
            let config_path = dir.join(HUGGINGPLACE_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            if !dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Load `path` if given, otherwise discover; absent config means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            let config = Self::from_path(path)?;
            tracing::debug!("Loaded config from {}", path.display());
            return Ok(config);
        }

        match Self::find_and_load()? {
            Some((config, path)) => {
                tracing::debug!("Found config at {}", path.display());
                Ok(config)
            }
            None => {
                tracing::debug!("No .huggingplace/config.toml found, using environment only");
                Ok(Self::default())
            }
        }
    }

    /// Combine file values with overrides into a client configuration.
    ///
    /// Fails with a readable message when the credential or organization is missing.
    pub fn resolve(self, overrides: Overrides) -> Result<ClientConfig> {
        let Some(api_key) = non_empty(overrides.api_key.or(self.api_key)) else {
            bail!("HUGGINGPLACE_API_KEY environment variable is required");
        };
        let Some(org_id) = non_empty(overrides.org_id.or(self.org_id)) else {
            bail!("HUGGINGPLACE_ORG_ID environment variable is required");
        };

        let mut config = ClientConfig::new(api_key, org_id);
        config.base_url = non_empty(overrides.base_url.or(self.base_url));
        config.mode = overrides.mode.or(self.mode).unwrap_or_default();
        if let Some(timeout) = overrides.timeout.or(self.timeout) {
            config.timeout_ms = timeout;
        }
        config.silent = overrides.silent || self.silent.unwrap_or(false);
        if let Some(trace) = self.trace {
            config.trace = trace;
        }
        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
