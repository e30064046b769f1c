//! Cross-crate integration and E2E tests
//!
//! A mock HuggingPlace API receives both interaction logs and trace records,
//! so full client workflows can be checked from the server's side.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, Uri},
    routing::post,
};
use huggingplace::{ClientConfig, ConfigUpdate, HuggingPlace, LogOptions, SessionOptions};
use huggingplace_trace::{
    FlowStep, LlmCall, LlmMetadata, SpanOptions, TraceConfig, TraceRecord, generate_id,
};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type Inbox = Arc<Mutex<Vec<(String, Value)>>>;

struct MockBackend {
    addr: SocketAddr,
    inbox: Inbox,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockBackend {
    async fn start() -> Self {
        let inbox: Inbox = Arc::default();
        let app = Router::new()
            .route("/v2/chatgpt/store_generated_response", post(store))
            .route("/api/traces", post(ingest))
            .route("/api/traces/batch", post(ingest))
            .with_state(Arc::clone(&inbox));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .ok();
        });

        Self {
            addr,
            inbox,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn bodies(&self, path: &str) -> Vec<Value> {
        self.inbox
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Every trace record received, single or batched, in arrival order.
    fn trace_records(&self) -> Vec<TraceRecord> {
        let mut records = Vec::new();
        for (path, body) in self.inbox.lock().unwrap().iter() {
            match path.as_str() {
                "/api/traces" => records.push(serde_json::from_value(body.clone()).unwrap()),
                "/api/traces/batch" => {
                    let batch: Vec<TraceRecord> = serde_json::from_value(body.clone()).unwrap();
                    records.extend(batch);
                }
                _ => {}
            }
        }
        records
    }

    async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn store(State(inbox): State<Inbox>, uri: Uri, Json(body): Json<Value>) -> Json<Value> {
    inbox.lock().unwrap().push((uri.path().to_string(), body));
    Json(json!({"message": "stored"}))
}

async fn ingest(
    State(inbox): State<Inbox>,
    uri: Uri,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    inbox.lock().unwrap().push((uri.path().to_string(), body));
    (StatusCode::CREATED, Json(json!({"ok": true})))
}

fn client_config(backend: &MockBackend, trace: TraceConfig) -> ClientConfig {
    ClientConfig::new("e2e-key", "org-e2e")
        .with_base_url(backend.url())
        .with_silent(true)
        .with_trace(trace.with_retry_delay(Duration::from_millis(5)))
}

/// E2E Test: a RAG-style request traced end to end and logged as an interaction.
#[tokio::test]
async fn test_e2e_traced_request_and_interaction_log() {
    let backend = MockBackend::start().await;
    let client = HuggingPlace::new(client_config(
        &backend,
        TraceConfig::default().with_batch_size(10),
    ))
    .unwrap();

    let trace_id = generate_id();
    let tracer = client.tracer().clone();

    let steps = vec![
        FlowStep::new("retrieve", |_| async {
            Ok::<_, std::io::Error>(json!(["doc-1", "doc-2"]))
        }),
        FlowStep::new("rerank", |prev: Vec<_>| async move {
            let docs = prev[0].value().cloned().unwrap_or(Value::Null);
            Ok(json!({"top": docs[0].clone()}))
        }),
    ];
    let outcomes = tracer
        .trace_flow("rag", steps, SpanOptions::new().with_trace_id(trace_id.clone()))
        .await
        .unwrap();
    assert_eq!(outcomes[1].value().unwrap()["top"], "doc-1");

    let answer: Result<String, std::io::Error> = tracer
        .trace_llm(
            "generate",
            LlmCall::new(LlmMetadata::new("openai", "gpt-4").with_temperature(0.2))
                .with_prompt("Answer using doc-1"),
            SpanOptions::new()
                .with_trace_id(trace_id.clone())
                .with_parent_span_id(trace_id.clone()),
            async { Ok("Rust is a systems language.".to_string()) },
        )
        .await;
    let answer = answer.unwrap();

    client
        .log(
            LogOptions::new("What is Rust?", answer.clone())
                .with_session_id(trace_id.clone())
                .with_llm_model("gpt-4"),
        )
        .await
        .unwrap();
    client.shutdown().await;

    let records = backend.trace_records();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.trace_id == trace_id));
    assert!(records.iter().all(|r| r.validate().is_ok()));
    assert_eq!(records[2].operation, "generate");
    assert_eq!(records[2].attributes["llm.model"], "gpt-4");

    // Ten-record batches never filled: everything went out on shutdown in one request.
    assert_eq!(backend.bodies("/api/traces/batch").len(), 1);

    let logged = backend.bodies("/v2/chatgpt/store_generated_response");
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0]["ai_response"], answer);
    assert_eq!(logged[0]["session_id"], trace_id);
    assert_eq!(logged[0]["org_id"], "org-e2e");

    backend.shutdown().await;
}

/// Partial batches are flushed by the timer without an explicit flush.
#[tokio::test]
async fn test_batch_timeout_delivers_partial_batch() {
    let backend = MockBackend::start().await;
    let client = HuggingPlace::new(client_config(
        &backend,
        TraceConfig::default()
            .with_batch_size(50)
            .with_batch_timeout(Duration::from_millis(50)),
    ))
    .unwrap();

    for i in 0..3 {
        let _: Result<i32, std::io::Error> = client
            .tracer()
            .trace_step(format!("step-{}", i), SpanOptions::new(), async move { Ok(i) })
            .await;
    }
    assert_eq!(client.sender().pending(), 3);

    let mut delivered = 0;
    for _ in 0..100 {
        delivered = backend.trace_records().len();
        if delivered == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(delivered, 3);
    assert_eq!(client.sender().pending(), 0);

    backend.shutdown().await;
}

/// Session logs and traces share the session's identity.
#[tokio::test]
async fn test_session_interactions_alongside_traces() {
    let backend = MockBackend::start().await;
    let client = HuggingPlace::new(client_config(
        &backend,
        TraceConfig::default().with_batch_size(1),
    ))
    .unwrap();

    let session = client.start_session(
        None,
        SessionOptions::new().with_user_metadata("user", "u-1"),
    );
    let _: Result<(), std::io::Error> = client
        .tracer()
        .trace_step(
            "lookup",
            SpanOptions::new()
                .with_trace_id(session.id())
                .with_user_metadata("user", "u-1"),
            async { Ok(()) },
        )
        .await;
    session.log(LogOptions::new("hi", "hello")).await.unwrap();

    let records = backend.trace_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].trace_id, session.id());
    assert_eq!(records[0].metadata.user_metadata["user"], "u-1");

    let logged = backend.bodies("/v2/chatgpt/store_generated_response");
    assert_eq!(logged[0]["session_id"], session.id());
    assert_eq!(logged[0]["user_meta_data"]["user"], "u-1");

    backend.shutdown().await;
}

/// After a config update, new traces go to the new collector while records
/// buffered under the old configuration still reach the old one.
#[tokio::test]
async fn test_update_config_redirects_traces() {
    let first = MockBackend::start().await;
    let second = MockBackend::start().await;
    let mut client = HuggingPlace::new(client_config(
        &first,
        TraceConfig::default().with_batch_size(10),
    ))
    .unwrap();

    let _: Result<u8, std::io::Error> = client
        .tracer()
        .trace_step("before", SpanOptions::new(), async { Ok(1) })
        .await;
    let old_sender = client.sender().clone();

    client
        .update_config(
            ConfigUpdate::new()
                .base_url(second.url())
                .trace(TraceConfig::default().with_batch_size(1)),
        )
        .unwrap();
    let _: Result<u8, std::io::Error> = client
        .tracer()
        .trace_step("after", SpanOptions::new(), async { Ok(2) })
        .await;

    old_sender.shutdown().await;

    let old_records = first.trace_records();
    assert_eq!(old_records.len(), 1);
    assert_eq!(old_records[0].operation, "before");

    let new_records = second.trace_records();
    assert_eq!(new_records.len(), 1);
    assert_eq!(new_records[0].operation, "after");

    first.shutdown().await;
    second.shutdown().await;
}
