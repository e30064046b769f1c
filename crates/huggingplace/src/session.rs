//! Sessions group related interactions under one id.

use huggingplace_trace::Fields;
use serde::Serialize;

use crate::client::HuggingPlace;
use crate::error::Result;
use crate::interaction::{LogOptions, StepLog};

/// Defaults applied to every interaction logged through a session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub metadata: Fields,
    pub user_metadata: Fields,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), v);
        }
        self
    }

    pub fn with_user_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.user_metadata.insert(key.into(), v);
        }
        self
    }
}

/// Snapshot returned by [`Session::info`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub default_metadata: Fields,
    pub default_user_metadata: Fields,
}

/// A series of interactions sharing a session id and default metadata.
#[derive(Debug)]
pub struct Session<'a> {
    client: &'a HuggingPlace,
    session_id: String,
    default_metadata: Fields,
    default_user_metadata: Fields,
}

impl<'a> Session<'a> {
    pub(crate) fn new(client: &'a HuggingPlace, session_id: String, options: SessionOptions) -> Self {
        Self {
            client,
            session_id,
            default_metadata: options.metadata,
            default_user_metadata: options.user_metadata,
        }
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    /// Log an interaction with the session defaults merged in.
    pub async fn log(&self, options: LogOptions) -> Result<()> {
        self.client.log(self.apply_defaults(options)).await
    }

    /// Caller values win over defaults; the session id fills an empty one.
    pub fn apply_defaults(&self, mut options: LogOptions) -> LogOptions {
        if options.session_id.as_deref().is_none_or(str::is_empty) {
            options.session_id = Some(self.session_id.clone());
        }
        options.metadata = Some(merge(&self.default_metadata, options.metadata.take()));
        options.user_metadata = Some(merge(
            &self.default_user_metadata,
            options.user_metadata.take(),
        ));
        options
    }

    pub async fn log_step(&self, step: StepLog) -> Result<()> {
        self.client.log_step(step).await
    }

    /// Extend the defaults. Existing keys are overwritten.
    pub fn update_defaults(&mut self, metadata: Option<Fields>, user_metadata: Option<Fields>) {
        if let Some(metadata) = metadata {
            self.default_metadata.extend(metadata);
        }
        if let Some(user_metadata) = user_metadata {
            self.default_user_metadata.extend(user_metadata);
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            default_metadata: self.default_metadata.clone(),
            default_user_metadata: self.default_user_metadata.clone(),
        }
    }
}

fn merge(defaults: &Fields, overrides: Option<Fields>) -> Fields {
    let mut merged = defaults.clone();
    merged.extend(overrides.unwrap_or_default());
    merged
}
