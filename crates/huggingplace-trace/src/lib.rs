//! Trace instrumentation and delivery for AI workflows.
//!
//! This crate provides:
//!
//! - **Types**: the [`TraceRecord`] wire format and its logs/metadata blocks
//! - **Tracer**: span wrapping for single steps, LLM calls and multi-step flows
//! - **Sender**: size/time batching with bounded exponential-backoff retry
//!
//! Instrumentation never changes what the wrapped work returns: delivery
//! failures are logged and absorbed inside the sender.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use huggingplace_trace::{BatchSender, SpanOptions, TraceConfig, Tracer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sender = BatchSender::new(TraceConfig::default().with_api_key("hp-key"))?;
//!     let tracer = Tracer::new(Arc::new(sender.clone()));
//!
//!     let answer: Result<String, std::io::Error> = tracer
//!         .trace_step("answer", SpanOptions::new().with_tag("demo"), async {
//!             Ok("42".to_string())
//!         })
//!         .await;
//!
//!     sender.shutdown().await;
//!     println!("{}", answer?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod flow;
pub mod ids;
pub mod llm;
pub mod retry;
pub mod sender;
pub mod tracer;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DEFAULT_BASE_URL, TraceConfig, TraceEndpoints};
pub use error::{Result, TraceError};
pub use flow::{FlowStep, StepOutcome};
pub use ids::{duration_ms, generate_id, now_millis};
pub use llm::{LlmCall, LlmMetadata};
pub use retry::{
    Delivery, RetryPolicy, SharedSleeper, Sleeper, TokioSleeper, deliver_with_retry,
};
pub use sender::{BatchSender, SenderState};
pub use tracer::{SpanOptions, TraceSink, Tracer, error_kind};
pub use transport::{
    HttpTransport, STATUS_CREATED, SharedTransport, Transport, TransportResponse, default_headers,
};
pub use types::{
    Fields, OtelContext, Outcome, SERVICE_NAME, SpanStatus, TraceLogs, TraceMetadata, TraceRecord,
};
