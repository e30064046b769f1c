//! Trace record types as they travel to the collector.
//!
//! Field names follow the collector's camelCase wire format.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TraceError};

/// Free-form string-keyed values used for attributes, logs and metadata blocks.
pub type Fields = HashMap<String, Value>;

/// Service name stamped on every record.
pub const SERVICE_NAME: &str = "huggingplace-sdk";

/// Terminal outcome of the wrapped work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// How the wrapped work ended, as recorded in the record's logs.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The work returned a value.
    Success { response: Value },

    /// The work failed.
    Failure { error: String, error_type: String },
}

impl Outcome {
    /// Status matching this outcome.
    pub fn status(&self) -> SpanStatus {
        match self {
            Outcome::Success { .. } => SpanStatus::Ok,
            Outcome::Failure { .. } => SpanStatus::Error,
        }
    }
}

/// Logs captured for a span.
///
/// On the wire this is one flat object: the free-form entries plus either
/// `functionResponse`/`success: true` or `error`/`errorType`/`success: false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Map<String, Value>", try_from = "Map<String, Value>")]
pub struct TraceLogs {
    /// Caller- and tracer-supplied entries.
    pub entries: Fields,

    /// Success or failure shape.
    pub outcome: Outcome,
}

/// Keys owned by the outcome; caller entries with these names are dropped.
const RESERVED_LOG_KEYS: &[&str] = &["functionResponse", "success", "error", "errorType"];

impl From<TraceLogs> for Map<String, Value> {
    fn from(logs: TraceLogs) -> Self {
        let mut map: Map<String, Value> = logs.entries.into_iter().collect();
        for key in RESERVED_LOG_KEYS {
            map.remove(*key);
        }
        match logs.outcome {
            Outcome::Success { response } => {
                map.insert("functionResponse".to_string(), response);
                map.insert("success".to_string(), Value::Bool(true));
            }
            Outcome::Failure { error, error_type } => {
                map.insert("error".to_string(), Value::String(error));
                map.insert("errorType".to_string(), Value::String(error_type));
                map.insert("success".to_string(), Value::Bool(false));
            }
        }
        map
    }
}

impl TryFrom<Map<String, Value>> for TraceLogs {
    type Error = String;

    fn try_from(mut map: Map<String, Value>) -> std::result::Result<Self, Self::Error> {
        let success = map
            .remove("success")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| "logs.success must be a boolean".to_string())?;

        let outcome = if success {
            Outcome::Success {
                response: map.remove("functionResponse").unwrap_or(Value::Null),
            }
        } else {
            let mut take_string = |key: &str| match map.remove(key) {
                Some(Value::String(s)) => Ok(s),
                _ => Err(format!("logs.{key} must be a string on failure")),
            };
            let error = take_string("error")?;
            let error_type = take_string("errorType")?;
            Outcome::Failure { error, error_type }
        };

        for key in RESERVED_LOG_KEYS {
            map.remove(*key);
        }

        Ok(Self {
            entries: map.into_iter().collect(),
            outcome,
        })
    }
}

/// Caller-supplied metadata bundled with each record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceMetadata {
    #[serde(default)]
    pub user_metadata: Fields,

    #[serde(default)]
    pub org_data: Fields,

    /// Model parameters, present on LLM spans only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_data: Option<Value>,

    #[serde(default)]
    pub custom_metadata: Fields,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub priority: Option<String>,

    pub step_name: String,
    pub trace_id: String,
    pub parent_span_id: String,
    pub span_id: String,
}

/// OpenTelemetry-compatible id echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtelContext {
    pub otel_trace_id: String,
    pub otel_span_id: String,
}

/// One instrumented unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    /// Identifies the whole logical operation; shared by all its spans.
    pub trace_id: String,

    /// Identifies this step. Fresh per span, never re-minted on retry.
    pub span_id: String,

    pub parent_span_id: String,

    /// Human-readable step name.
    pub operation: String,

    pub service: String,
    pub status: SpanStatus,

    /// Millisecond epoch timestamps.
    pub start_time: u64,
    pub end_time: u64,
    pub duration_ms: u64,

    #[serde(default)]
    pub attributes: Fields,

    pub logs: TraceLogs,
    pub metadata: TraceMetadata,
    pub otel_context: OtelContext,
}

impl TraceRecord {
    /// Check the fields the collector requires before anything goes on the wire.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("traceId", &self.trace_id),
            ("spanId", &self.span_id),
            ("operation", &self.operation),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TraceError::Validation(format!(
                "trace record missing required fields: {}",
                missing.join(", ")
            )))
        }
    }

    /// Whether the wrapped work succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == SpanStatus::Ok
    }
}
