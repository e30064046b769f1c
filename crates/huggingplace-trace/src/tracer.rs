//! Span tracer.
//!
//! Wraps a unit of work (any future yielding a `Result`), times it, and emits
//! one [`TraceRecord`] to the configured sink before handing the work's own
//! result back unchanged.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::ids::{duration_ms, generate_id, now_millis};
use crate::types::{
    Fields, OtelContext, Outcome, SERVICE_NAME, TraceLogs, TraceMetadata, TraceRecord,
};

/// Destination for completed trace records.
///
/// Implementations must absorb their own failures: a sink never fails the
/// traced work.
#[async_trait]
pub trait TraceSink: Send + Sync {
    async fn send(&self, record: TraceRecord);
}

/// Per-span inputs. Ids are generated when left unset.
#[derive(Debug, Clone, Default)]
pub struct SpanOptions {
    pub trace_id: Option<String>,
    pub parent_span_id: Option<String>,
    pub user_metadata: Fields,
    pub org_data: Fields,
    pub custom_metadata: Fields,
    pub logs: Fields,
    pub attributes: Fields,
    pub tags: Vec<String>,
    pub priority: Option<String>,
    /// Overrides the `errorType` derived from the error's type.
    pub error_type: Option<String>,
}

fn insert_value(fields: &mut Fields, key: impl Into<String>, value: impl Serialize) {
    if let Ok(v) = serde_json::to_value(value) {
        fields.insert(key.into(), v);
    }
}

impl SpanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_parent_span_id(mut self, parent_span_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent_span_id.into());
        self
    }

    pub fn with_user_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        insert_value(&mut self.user_metadata, key, value);
        self
    }

    pub fn with_org_data(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        insert_value(&mut self.org_data, key, value);
        self
    }

    pub fn with_custom_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        insert_value(&mut self.custom_metadata, key, value);
        self
    }

    pub fn with_log(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        insert_value(&mut self.logs, key, value);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        insert_value(&mut self.attributes, key, value);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }
}

/// Short name of an error type, used as a record's `errorType`.
///
/// `std::io::Error` becomes `Error`, `my_crate::StepError<T>` becomes `StepError`.
/// `Box`, `Arc` and `Rc` wrappers are looked through, and trait objects are
/// named by their principal trait: `Box<dyn std::error::Error + Send>` becomes
/// `Error`. Use [`SpanOptions::with_error_type`] when the type says too little.
pub fn error_kind<E: ?Sized>() -> String {
    short_type_name(std::any::type_name::<E>())
}

fn short_type_name(full: &str) -> String {
    let mut name = full.trim();
    loop {
        if let Some((head, rest)) = name.split_once('<') {
            let outer = head.rsplit("::").next().unwrap_or(head);
            if matches!(outer, "Box" | "Arc" | "Rc") && rest.ends_with('>') {
                name = rest[..rest.len() - 1].trim();
                continue;
            }
        }
        if let Some(object) = name.strip_prefix("dyn ") {
            name = object.split(" + ").next().unwrap_or(object);
        }
        break;
    }
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Emits trace records for wrapped work.
///
/// Cheap to clone; clones share the sink.
#[derive(Clone, Default)]
pub struct Tracer {
    sink: Option<Arc<dyn TraceSink>>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.sink.is_some())
            .finish()
    }
}

impl Tracer {
    /// Tracer that delivers records to `sink`.
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Tracer that runs work and builds records but delivers nothing.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Run `work` as the span `step_name`.
    ///
    /// The record is handed to the sink before this returns; the returned
    /// value or error is exactly what `work` produced.
    pub async fn trace_step<Fut, T, E>(
        &self,
        step_name: impl Into<String>,
        options: SpanOptions,
        work: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        T: Serialize,
        E: fmt::Display,
    {
        self.run_span(step_name.into(), options, None, work).await
    }

    pub(crate) async fn run_span<Fut, T, E>(
        &self,
        step_name: String,
        options: SpanOptions,
        llm_data: Option<Value>,
        work: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        T: Serialize,
        E: fmt::Display,
    {
        let SpanOptions {
            trace_id,
            parent_span_id,
            user_metadata,
            org_data,
            custom_metadata,
            logs,
            attributes,
            tags,
            priority,
            error_type,
        } = options;

        let trace_id = trace_id.unwrap_or_else(generate_id);
        let parent_span_id = parent_span_id.unwrap_or_else(generate_id);
        let span_id = generate_id();
        let start_time = now_millis();

        let result = work.await;

        let end_time = now_millis().max(start_time);
        let outcome = match &result {
            Ok(value) => Outcome::Success {
                response: serde_json::to_value(value)
                    .unwrap_or_else(|e| Value::String(format!("<unserializable result: {e}>"))),
            },
            Err(error) => Outcome::Failure {
                error: error.to_string(),
                error_type: error_type.unwrap_or_else(error_kind::<E>),
            },
        };

        tracing::debug!(
            trace_id = %trace_id,
            span_id = %span_id,
            operation = %step_name,
            status = ?outcome.status(),
            "Span completed"
        );

        let record = TraceRecord {
            status: outcome.status(),
            logs: TraceLogs {
                entries: logs,
                outcome,
            },
            metadata: TraceMetadata {
                user_metadata,
                org_data,
                llm_data,
                custom_metadata,
                tags,
                priority,
                step_name: step_name.clone(),
                trace_id: trace_id.clone(),
                parent_span_id: parent_span_id.clone(),
                span_id: span_id.clone(),
            },
            otel_context: OtelContext {
                otel_trace_id: trace_id.clone(),
                otel_span_id: span_id.clone(),
            },
            trace_id,
            span_id,
            parent_span_id,
            operation: step_name,
            service: SERVICE_NAME.to_string(),
            start_time,
            end_time,
            duration_ms: duration_ms(start_time, end_time),
            attributes,
        };

        if let Some(sink) = &self.sink {
            sink.send(record).await;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use crate::types::SpanStatus;
    use serde_json::json;

    #[derive(Debug)]
    struct QuotaExceeded(u32);

    impl fmt::Display for QuotaExceeded {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "quota exceeded after {} calls", self.0)
        }
    }

    fn tracer() -> (Tracer, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (Tracer::new(sink.clone()), sink)
    }

    #[test]
    fn test_error_kind_strips_path_and_generics() {
        assert_eq!(error_kind::<std::io::Error>(), "Error");
        assert_eq!(error_kind::<QuotaExceeded>(), "QuotaExceeded");
        assert_eq!(error_kind::<Option<std::io::Error>>(), "Option");
    }

    #[test]
    fn test_error_kind_looks_through_smart_pointers() {
        assert_eq!(error_kind::<Box<QuotaExceeded>>(), "QuotaExceeded");
        assert_eq!(error_kind::<Arc<QuotaExceeded>>(), "QuotaExceeded");
        assert_eq!(
            error_kind::<Box<dyn std::error::Error + Send + Sync>>(),
            "Error"
        );
        assert_eq!(error_kind::<dyn std::error::Error>(), "Error");
    }

    #[tokio::test]
    async fn test_boxed_error_recorded_without_wrapper_name() {
        let (tracer, sink) = tracer();

        let result: Result<u8, Box<dyn std::error::Error + Send + Sync>> = tracer
            .trace_step("read_config", SpanOptions::new(), async {
                Err(std::io::Error::other("disk gone").into())
            })
            .await;
        assert!(result.is_err());

        let rec = &sink.records()[0];
        match &rec.logs.outcome {
            Outcome::Failure { error, error_type } => {
                assert_eq!(error, "disk gone");
                assert_ne!(error_type, "Box");
                assert_eq!(error_type, "Error");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_type_override() {
        let (tracer, sink) = tracer();

        let _: Result<u8, Box<dyn std::error::Error + Send + Sync>> = tracer
            .trace_step(
                "read_config",
                SpanOptions::new().with_error_type("ConfigMissing"),
                async { Err("no config".into()) },
            )
            .await;
        let _: Result<u8, QuotaExceeded> = tracer
            .trace_step(
                "unused_override",
                SpanOptions::new().with_error_type("ConfigMissing"),
                async { Ok(1) },
            )
            .await;

        let records = sink.records();
        assert_eq!(
            records[0].logs.outcome,
            Outcome::Failure {
                error: "no config".to_string(),
                error_type: "ConfigMissing".to_string(),
            }
        );
        assert_eq!(records[1].logs.outcome, Outcome::Success { response: json!(1) });
    }

    #[tokio::test]
    async fn test_caller_log_named_error_does_not_leak_into_success() {
        let (tracer, sink) = tracer();

        let _: Result<u8, QuotaExceeded> = tracer
            .trace_step(
                "ok_step",
                SpanOptions::new()
                    .with_log("error", "caller note")
                    .with_log("input", "hello"),
                async { Ok(1) },
            )
            .await;

        let wire = serde_json::to_value(&sink.records()[0]).unwrap();
        let logs = wire["logs"].as_object().unwrap();
        assert_eq!(logs["success"], true);
        assert_eq!(logs["functionResponse"], 1);
        assert_eq!(logs["input"], "hello");
        assert!(!logs.contains_key("error"));
        assert!(!logs.contains_key("errorType"));
    }

    #[tokio::test]
    async fn test_success_emits_ok_record() {
        let (tracer, sink) = tracer();

        let result: Result<_, QuotaExceeded> = tracer
            .trace_step(
                "classify",
                SpanOptions::new()
                    .with_trace_id("trace-1")
                    .with_parent_span_id("parent-1")
                    .with_tag("prod")
                    .with_priority("high")
                    .with_attribute("team", "search")
                    .with_log("input", "hello"),
                async { Ok(json!({"label": "greeting"})) },
            )
            .await;

        assert_eq!(result.unwrap()["label"], "greeting");

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.status, SpanStatus::Ok);
        assert_eq!(rec.trace_id, "trace-1");
        assert_eq!(rec.parent_span_id, "parent-1");
        assert_eq!(rec.operation, "classify");
        assert_eq!(rec.service, SERVICE_NAME);
        assert!(rec.end_time >= rec.start_time);
        assert_eq!(rec.duration_ms, rec.end_time - rec.start_time);
        assert_eq!(rec.attributes["team"], "search");
        assert_eq!(rec.logs.entries["input"], "hello");
        assert_eq!(
            rec.logs.outcome,
            Outcome::Success {
                response: json!({"label": "greeting"})
            }
        );
        assert_eq!(rec.metadata.tags, vec!["prod"]);
        assert_eq!(rec.metadata.priority.as_deref(), Some("high"));
        assert_eq!(rec.metadata.span_id, rec.span_id);
        assert_eq!(rec.otel_context.otel_span_id, rec.span_id);
        assert!(rec.validate().is_ok());
    }

    #[tokio::test]
    async fn test_failure_emits_error_record_and_returns_error() {
        let (tracer, sink) = tracer();

        let result: Result<u32, _> = tracer
            .trace_step("call_model", SpanOptions::new(), async {
                Err(QuotaExceeded(7))
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.0, 7);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.status, SpanStatus::Error);
        assert_eq!(
            rec.logs.outcome,
            Outcome::Failure {
                error: "quota exceeded after 7 calls".to_string(),
                error_type: "QuotaExceeded".to_string(),
            }
        );
        let wire = serde_json::to_value(rec).unwrap();
        assert_eq!(wire["logs"]["success"], false);
    }

    #[tokio::test]
    async fn test_ids_generated_when_omitted() {
        let (tracer, sink) = tracer();

        for _ in 0..2 {
            let _: Result<(), QuotaExceeded> =
                tracer.trace_step("noop", SpanOptions::new(), async { Ok(()) }).await;
        }

        let records = sink.records();
        assert!(!records[0].trace_id.is_empty());
        assert!(!records[0].parent_span_id.is_empty());
        assert_ne!(records[0].span_id, records[1].span_id);
        assert_ne!(records[0].trace_id, records[1].trace_id);
    }

    #[tokio::test]
    async fn test_work_runs_once_and_record_precedes_return() {
        let (tracer, sink) = tracer();
        let calls = std::sync::atomic::AtomicUsize::new(0);

        let value: Result<usize, QuotaExceeded> = tracer
            .trace_step("count", SpanOptions::new(), async {
                Ok(calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1)
            })
            .await;

        assert_eq!(value.unwrap(), 1);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_tracer_is_transparent() {
        let tracer = Tracer::disabled();
        assert!(!tracer.is_enabled());

        let result: Result<&str, QuotaExceeded> = tracer
            .trace_step("noop", SpanOptions::new(), async { Ok("value") })
            .await;
        assert_eq!(result.unwrap(), "value");
    }

    #[tokio::test]
    async fn test_duration_covers_work() {
        let (tracer, sink) = tracer();

        let _: Result<(), QuotaExceeded> = tracer
            .trace_step("slow", SpanOptions::new(), async {
                std::thread::sleep(std::time::Duration::from_millis(20));
                Ok(())
            })
            .await;

        assert!(sink.records()[0].duration_ms >= 20);
    }
}
