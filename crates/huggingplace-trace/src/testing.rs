//! In-memory fakes for the transport, sleeper and trace sink.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, TraceError};
use crate::retry::Sleeper;
use crate::tracer::TraceSink;
use crate::transport::{Transport, TransportResponse};
use crate::types::TraceRecord;

/// A captured POST.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub url: String,
    pub body: Bytes,
    pub timeout: Duration,
}

impl CapturedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("captured body is JSON")
    }
}

/// Transport that replays queued results and records every request.
///
/// Answers `201 {}` once the queue is empty.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<TransportResponse>>>,
    requests: Mutex<Vec<CapturedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_status(&self, status: u16, body: &'static str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(TransportResponse::new(status, body)));
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TraceError::Transport(message.to_string())));
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn bodies(&self) -> Vec<Bytes> {
        self.requests().into_iter().map(|r| r.body).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, url: &str, body: Bytes, timeout: Duration) -> Result<TransportResponse> {
        self.requests.lock().unwrap().push(CapturedRequest {
            url: url.to_string(),
            body,
            timeout,
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(TransportResponse::new(201, "{}")))
    }
}

/// Sleeper that returns immediately and remembers what it was asked to wait.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Sink that keeps every emitted record.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<TraceRecord>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl TraceSink for RecordingSink {
    async fn send(&self, record: TraceRecord) {
        self.records.lock().unwrap().push(record);
    }
}
