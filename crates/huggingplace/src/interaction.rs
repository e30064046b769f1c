//! Interaction payloads posted to the logging endpoint.

use std::time::Duration;

use huggingplace_trace::Fields;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::Mode;
use crate::error::{HuggingPlaceError, Result};

/// One logged interaction.
///
/// Field names are the wire names. Unknown keys survive in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_response: Option<String>,
    /// Alternative to `ai_response`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<i64>,
    #[serde(rename = "metaData", skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<Fields>,
    /// Session-level metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Fields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_roles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_table: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_data: Option<Vec<Value>>,
    /// Any format, sent as given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_meta_data: Option<Fields>,
    /// Alternative to `user_meta_data`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<Fields>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LogOptions {
    pub fn new(user_prompt: impl Into<String>, ai_response: impl Into<String>) -> Self {
        Self {
            user_prompt: Some(user_prompt.into()),
            ai_response: Some(ai_response.into()),
            ..Default::default()
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_llm_model(mut self, model: impl Into<String>) -> Self {
        self.llm_model = Some(model.into());
        self
    }

    pub fn with_token_count(mut self, count: i64) -> Self {
        self.token_count = Some(count);
        self
    }

    pub fn with_response_time(mut self, response_time: impl Into<Value>) -> Self {
        self.response_time = Some(response_time.into());
        self
    }

    /// Add a `metaData` entry.
    pub fn with_meta_data(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.meta_data
                .get_or_insert_with(Fields::new)
                .insert(key.into(), v);
        }
        self
    }

    /// Add a session-level `metadata` entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata
                .get_or_insert_with(Fields::new)
                .insert(key.into(), v);
        }
        self
    }

    pub fn with_user_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.user_metadata
                .get_or_insert_with(Fields::new)
                .insert(key.into(), v);
        }
        self
    }

    pub fn with_step_data(mut self, steps: Vec<Value>) -> Self {
        self.step_data = Some(steps);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if matches!(self.token_count, Some(count) if count < 0) {
            return Err(HuggingPlaceError::Validation(
                "Token count must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the alternative field names.
    ///
    /// `response` is copied into `ai_response` (both are sent);
    /// `user_metadata` is moved into `user_meta_data`.
    pub fn normalized(mut self) -> Self {
        if self.ai_response.is_none() {
            self.ai_response = self.response.clone();
        }
        if self.user_meta_data.is_none() {
            self.user_meta_data = self.user_metadata.take();
        }
        self
    }

    /// Fill any unset field from `defaults`.
    pub(crate) fn or(mut self, defaults: LogOptions) -> Self {
        macro_rules! fill {
            ($($field:ident),*) => {
                $(if self.$field.is_none() { self.$field = defaults.$field; })*
            };
        }
        fill!(
            user_prompt,
            ai_response,
            response,
            user_uuid,
            file_name,
            session_id,
            llm_model,
            llm_model2,
            token_count,
            meta_data,
            metadata,
            user_roles,
            org_uuid,
            mapping_table,
            step_data,
            response_time,
            message_id,
            user_meta_data,
            user_metadata
        );
        for (key, value) in defaults.extra {
            self.extra.entry(key).or_insert(value);
        }
        self
    }

    /// Wire body: the normalized options plus `org_id` and `mode`.
    pub fn into_payload(self, org_id: &str, mode: Mode) -> Result<Value> {
        let mut body = match serde_json::to_value(self.normalized())? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        body.insert("org_id".to_string(), Value::String(org_id.to_string()));
        body.insert("mode".to_string(), Value::String(mode.to_string()));
        Ok(Value::Object(body))
    }
}

/// One processing step, logged as a minimal interaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepLog {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
}

impl StepLog {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: Some(step_name.into()),
            ..Default::default()
        }
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.user_question = Some(question.into());
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.prompt_response = Some(response.into());
        self
    }

    pub fn with_llm_model(mut self, model: impl Into<String>) -> Self {
        self.llm_model = Some(model.into());
        self
    }

    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.input_tokens = Some(input);
        self.output_tokens = Some(output);
        self.token = Some(i64::try_from(input.saturating_add(output)).unwrap_or(i64::MAX));
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_time_ms(mut self, time_ms: u64) -> Self {
        self.time_ms = Some(time_ms);
        self
    }

    /// The minimal interaction carrying this step as its only `step_data` entry.
    pub fn to_log_options(&self) -> LogOptions {
        LogOptions {
            user_prompt: Some(self.user_question.clone().unwrap_or_default()),
            ai_response: Some(self.prompt_response.clone().unwrap_or_default()),
            llm_model: self.llm_model.clone(),
            token_count: self.token,
            response_time: self.response_time.clone(),
            step_data: serde_json::to_value(self).ok().map(|step| vec![step]),
            ..Default::default()
        }
    }
}

/// Render an elapsed time as `"<m> min <s.ss> sec"`.
pub fn format_response_time(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let minutes = (secs / 60.0).floor();
    format!("{} min {:.2} sec", minutes as u64, secs - minutes * 60.0)
}
