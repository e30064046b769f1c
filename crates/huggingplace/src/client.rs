//! The HuggingPlace client.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use huggingplace_trace::{BatchSender, Fields, Tracer, default_headers};
use reqwest::Client;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ConfigUpdate, SafeConfig};
use crate::error::{HuggingPlaceError, Result, TimedLogError};
use crate::interaction::{LogOptions, StepLog, format_response_time};
use crate::session::{Session, SessionOptions};

/// Path of the interaction-logging endpoint, relative to the base URL.
pub const STORE_INTERACTION_PATH: &str = "/v2/chatgpt/store_generated_response";

/// Client for interaction logging and workflow tracing.
///
/// Owns one [`BatchSender`] and a [`Tracer`] bound to it. Records still
/// buffered when the client is dropped are flushed in the background.
pub struct HuggingPlace {
    config: ClientConfig,
    http: Client,
    sender: BatchSender,
    tracer: Tracer,
}

impl fmt::Debug for HuggingPlace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuggingPlace")
            .field("config", &self.config.redacted())
            .field("sender", &self.sender.state())
            .finish()
    }
}

impl HuggingPlace {
    /// Validate the configuration and build the HTTP client, sender and tracer.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let sender = BatchSender::new(config.trace_config())?;
        Self::with_sender(config, sender)
    }

    /// Build a client around an existing sender.
    pub fn with_sender(config: ClientConfig, sender: BatchSender) -> Result<Self> {
        config.validate()?;
        let http = build_http_client(&config)?;
        let tracer = Tracer::new(Arc::new(sender.clone()));
        Ok(Self {
            config,
            http,
            sender,
            tracer,
        })
    }

    pub fn store_url(&self) -> String {
        format!("{}{}", self.config.base_url(), STORE_INTERACTION_PATH)
    }

    /// Log one complete interaction.
    pub async fn log(&self, options: LogOptions) -> Result<()> {
        let result = self.post_interaction(options).await;
        if let Err(e) = &result {
            if !self.config.silent {
                warn!(error = %e, "Failed to log interaction to HuggingPlace");
            }
        }
        result
    }

    async fn post_interaction(&self, options: LogOptions) -> Result<()> {
        options.validate()?;
        let payload = options.into_payload(&self.config.org_id, self.config.mode)?;

        let response = self.http.post(self.store_url()).json(&payload).send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        if !self.config.silent {
            debug!(status, body = %body, "Interaction response");
        }

        if status != 200 {
            let message = body
                .get("message")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            return Err(HuggingPlaceError::from_response(status, message));
        }

        if !self.config.silent {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Successfully logged interaction");
            info!(message, "Logged interaction to HuggingPlace");
        }
        Ok(())
    }

    /// Log one processing step as a minimal interaction.
    pub async fn log_step(&self, step: StepLog) -> Result<()> {
        self.log(step.to_log_options()).await
    }

    /// Run `work`, then log it with its elapsed time.
    ///
    /// A failure is logged as `"Error: <message>"` with `metaData.error` set
    /// and then returned unchanged.
    pub async fn log_with_timing<Fut, E>(
        &self,
        user_prompt: impl Into<String>,
        work: Fut,
        options: LogOptions,
    ) -> std::result::Result<String, TimedLogError<E>>
    where
        Fut: Future<Output = std::result::Result<String, E>>,
        E: fmt::Display,
    {
        let user_prompt = user_prompt.into();
        let start = Instant::now();

        match work.await {
            Ok(response) => {
                let timed = LogOptions {
                    user_prompt: Some(user_prompt),
                    ai_response: Some(response.clone()),
                    response_time: Some(Value::String(format_response_time(start.elapsed()))),
                    ..Default::default()
                };
                self.log(options.or(timed))
                    .await
                    .map_err(TimedLogError::Log)?;
                Ok(response)
            }
            Err(err) => {
                let message = err.to_string();
                let mut options = options;
                let meta = options.meta_data.get_or_insert_with(Fields::new);
                meta.insert("error".to_string(), Value::Bool(true));
                meta.insert("error_message".to_string(), Value::String(message.clone()));

                let timed = LogOptions {
                    user_prompt: Some(user_prompt),
                    ai_response: Some(format!("Error: {}", message)),
                    response_time: Some(Value::String(format_response_time(start.elapsed()))),
                    ..Default::default()
                };
                // log() reports its own failure; the work's error is what the caller sees.
                let _ = self.log(options.or(timed)).await;
                Err(TimedLogError::Work(err))
            }
        }
    }

    /// Start a session. A UUID is generated when no id is given.
    pub fn start_session(
        &self,
        session_id: Option<String>,
        options: SessionOptions,
    ) -> Session<'_> {
        let session_id = session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Session::new(self, session_id, options)
    }

    /// Current configuration without the credential.
    pub fn config(&self) -> SafeConfig {
        self.config.redacted()
    }

    /// Merge `update` into the configuration.
    ///
    /// On success the HTTP client and sender are rebuilt. The previous sender
    /// is drained in the background. On failure nothing changes.
    pub fn update_config(&mut self, update: ConfigUpdate) -> Result<()> {
        let config = self.config.merged(update);
        config.validate()?;
        let http = build_http_client(&config)?;
        let sender = BatchSender::new(config.trace_config())?;

        let previous = std::mem::replace(&mut self.sender, sender);
        self.tracer = Tracer::new(Arc::new(self.sender.clone()));
        self.http = http;
        self.config = config;

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                previous.shutdown().await;
            });
        }
        Ok(())
    }

    /// Post a minimal interaction. Never fails: errors yield `false`.
    pub async fn test_connection(&self) -> bool {
        let payload = json!({
            "user_prompt": "connection_test",
            "ai_response": "test_response",
            "org_id": self.config.org_id,
            "mode": self.config.mode,
        });

        match self.http.post(self.store_url()).json(&payload).send().await {
            Ok(response) => response.status().as_u16() == 200,
            Err(e) => {
                if !self.config.silent {
                    warn!(error = %e, "Connection test failed");
                }
                false
            }
        }
    }

    /// Tracer bound to this client's sender.
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn sender(&self) -> &BatchSender {
        &self.sender
    }

    /// Flush buffered traces and wait for every in-flight delivery.
    pub async fn shutdown(&self) {
        self.sender.shutdown().await;
    }
}

impl Drop for HuggingPlace {
    fn drop(&mut self) {
        if tokio::runtime::Handle::try_current().is_ok() {
            self.sender.flush();
        }
    }
}

fn build_http_client(config: &ClientConfig) -> Result<Client> {
    let headers = default_headers(Some(config.api_key.as_str()), std::iter::empty())?;
    Client::builder()
        .default_headers(headers)
        .timeout(config.timeout())
        .build()
        .map_err(|e| HuggingPlaceError::Validation(format!("Failed to create HTTP client: {}", e)))
}
