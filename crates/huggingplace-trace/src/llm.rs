//! LLM call tracing.
//!
//! A thin layer over [`Tracer::trace_step`] that flattens model parameters
//! into `llm.*` attributes and records the prompt, messages and parameters
//! in the span's logs.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::tracer::{SpanOptions, Tracer};
use crate::types::Fields;

/// Model-call parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmMetadata {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
}

impl LlmMetadata {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
            model: Some(model.into()),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_frequency_penalty(mut self, penalty: f64) -> Self {
        self.frequency_penalty = Some(penalty);
        self
    }

    pub fn with_presence_penalty(mut self, penalty: f64) -> Self {
        self.presence_penalty = Some(penalty);
        self
    }

    /// `llm.*` attributes. Unset parameters are present as `null`.
    pub fn attributes(&self) -> Fields {
        Fields::from([
            ("llm.provider".to_string(), json!(self.provider)),
            ("llm.model".to_string(), json!(self.model)),
            ("llm.temperature".to_string(), json!(self.temperature)),
            ("llm.max_tokens".to_string(), json!(self.max_tokens)),
            ("llm.top_p".to_string(), json!(self.top_p)),
            ("llm.frequency_penalty".to_string(), json!(self.frequency_penalty)),
            ("llm.presence_penalty".to_string(), json!(self.presence_penalty)),
        ])
    }

    /// Sampling parameters as logged under `llm.parameters`.
    pub fn parameters(&self) -> Value {
        json!({
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "top_p": self.top_p,
            "frequency_penalty": self.frequency_penalty,
            "presence_penalty": self.presence_penalty,
        })
    }
}

/// What was sent to the model.
#[derive(Debug, Clone, Default)]
pub struct LlmCall {
    pub metadata: LlmMetadata,
    pub prompt: Option<Value>,
    pub messages: Option<Value>,
}

impl LlmCall {
    pub fn new(metadata: LlmMetadata) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    pub fn with_prompt(mut self, prompt: impl Serialize) -> Self {
        self.prompt = serde_json::to_value(prompt).ok();
        self
    }

    pub fn with_messages(mut self, messages: impl Serialize) -> Self {
        self.messages = serde_json::to_value(messages).ok();
        self
    }
}

impl Tracer {
    /// Trace a model invocation.
    ///
    /// Attributes and logs given in `options` override the `llm.*` entries
    /// with the same key. Success and failure behave as in [`Tracer::trace_step`].
    pub async fn trace_llm<Fut, T, E>(
        &self,
        step_name: impl Into<String>,
        call: LlmCall,
        mut options: SpanOptions,
        work: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        T: Serialize,
        E: fmt::Display,
    {
        let LlmCall {
            metadata,
            prompt,
            messages,
        } = call;

        let mut attributes = metadata.attributes();
        attributes.extend(std::mem::take(&mut options.attributes));
        options.attributes = attributes;

        let mut logs = Fields::from([
            ("llm.prompt".to_string(), prompt.unwrap_or(Value::Null)),
            ("llm.messages".to_string(), messages.unwrap_or(Value::Null)),
            ("llm.parameters".to_string(), metadata.parameters()),
        ]);
        logs.extend(std::mem::take(&mut options.logs));
        options.logs = logs;

        let llm_data = serde_json::to_value(&metadata).ok();
        self.run_span(step_name.into(), options, llm_data, work)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use crate::types::{Outcome, SpanStatus};
    use std::sync::Arc;

    fn metadata() -> LlmMetadata {
        LlmMetadata::new("openai", "gpt-4o")
            .with_temperature(0.2)
            .with_max_tokens(512)
            .with_top_p(0.9)
    }

    #[test]
    fn test_attributes_are_namespaced() {
        let attrs = metadata().attributes();
        assert_eq!(attrs["llm.provider"], "openai");
        assert_eq!(attrs["llm.model"], "gpt-4o");
        assert_eq!(attrs["llm.temperature"], 0.2);
        assert_eq!(attrs["llm.max_tokens"], 512);
        assert_eq!(attrs["llm.top_p"], 0.9);
        assert!(attrs["llm.frequency_penalty"].is_null());
        assert_eq!(attrs.len(), 7);
    }

    #[test]
    fn test_metadata_wire_names() {
        let value = serde_json::to_value(metadata()).unwrap();
        assert_eq!(value["maxTokens"], 512);
        assert_eq!(value["topP"], 0.9);
    }

    #[tokio::test]
    async fn test_llm_span_carries_model_fields() {
        let sink = Arc::new(RecordingSink::default());
        let tracer = Tracer::new(sink.clone());

        let call = LlmCall::new(metadata())
            .with_prompt("Summarize this")
            .with_messages(json!([{"role": "user", "content": "Summarize this"}]));
        let options = SpanOptions::new()
            .with_attribute("llm.model", "gpt-4o-mini")
            .with_log("llm.prompt", "redacted");

        let result: Result<_, std::io::Error> = tracer
            .trace_llm("summarize", call, options, async {
                Ok(json!({"text": "short", "usage": {"total_tokens": 42}}))
            })
            .await;
        assert_eq!(result.unwrap()["usage"]["total_tokens"], 42);

        let rec = &sink.records()[0];
        assert_eq!(rec.status, SpanStatus::Ok);
        assert_eq!(rec.attributes["llm.provider"], "openai");
        // caller attribute wins over the extracted one
        assert_eq!(rec.attributes["llm.model"], "gpt-4o-mini");
        assert_eq!(rec.logs.entries["llm.prompt"], "redacted");
        assert_eq!(rec.logs.entries["llm.messages"][0]["role"], "user");
        assert_eq!(rec.logs.entries["llm.parameters"]["max_tokens"], 512);
        assert_eq!(
            rec.metadata.llm_data.as_ref().unwrap()["model"],
            "gpt-4o"
        );
    }

    #[tokio::test]
    async fn test_llm_failure_is_propagated() {
        let sink = Arc::new(RecordingSink::default());
        let tracer = Tracer::new(sink.clone());

        let result: Result<Value, _> = tracer
            .trace_llm(
                "generate",
                LlmCall::new(metadata()),
                SpanOptions::new(),
                async { Err(std::io::Error::other("rate limited")) },
            )
            .await;

        assert_eq!(result.unwrap_err().to_string(), "rate limited");
        let rec = &sink.records()[0];
        assert_eq!(rec.status, SpanStatus::Error);
        assert!(matches!(
            &rec.logs.outcome,
            Outcome::Failure { error, .. } if error == "rate limited"
        ));
        assert!(rec.logs.entries["llm.prompt"].is_null());
    }
}
