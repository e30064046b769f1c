//! Batching trace sender.
//!
//! Records are buffered until either `batch_size` records are waiting or
//! `batch_timeout` passes without another insertion. A flush swaps the buffer
//! out under the lock and hands the snapshot to its own delivery task, so
//! records submitted while a batch is in flight start a fresh buffer.
//!
//! With `batch_size <= 1` records bypass the buffer and are delivered
//! immediately, the caller awaiting the retry loop.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use tokio::task::{AbortHandle, JoinHandle};

use crate::config::{TraceConfig, TraceEndpoints};
use crate::error::Result;
use crate::retry::{Delivery, RetryPolicy, SharedSleeper, TokioSleeper, deliver_with_retry};
use crate::tracer::TraceSink;
use crate::transport::{HttpTransport, SharedTransport};
use crate::types::TraceRecord;

/// Observable state of a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Nothing buffered, nothing in flight.
    Idle,
    /// Records buffered, flush timer armed.
    Accumulating,
    /// A batch is being transmitted and nothing new is buffered.
    Flushing,
}

#[derive(Default)]
struct Batch {
    records: Vec<TraceRecord>,
    timer: Option<JoinHandle<()>>,
}

/// A spawned delivery. `done` can be awaited by any number of callers.
struct InFlight {
    task: AbortHandle,
    done: Shared<BoxFuture<'static, ()>>,
}

struct Inner {
    config: TraceConfig,
    endpoints: TraceEndpoints,
    policy: RetryPolicy,
    transport: SharedTransport,
    sleeper: SharedSleeper,
    batch: Mutex<Batch>,
    in_flight: Mutex<Vec<InFlight>>,
}

/// Delivers trace records to the collector.
///
/// Cheap to clone; clones share one buffer. Must be used from within a tokio
/// runtime.
#[derive(Clone)]
pub struct BatchSender {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BatchSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSender")
            .field("base_url", &self.inner.config.base_url)
            .field("batch_size", &self.inner.config.batch_size)
            .field("pending", &self.pending())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BatchSender {
    /// Create a sender that talks HTTP to `config.base_url`.
    pub fn new(config: TraceConfig) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Create a sender over a custom transport.
    pub fn with_transport(config: TraceConfig, transport: SharedTransport) -> Self {
        Self::from_parts(config, transport, Arc::new(TokioSleeper))
    }

    /// Create a sender over a custom transport and backoff sleeper.
    pub fn from_parts(
        config: TraceConfig,
        transport: SharedTransport,
        sleeper: SharedSleeper,
    ) -> Self {
        let endpoints = config.endpoints();
        let policy = RetryPolicy::new(config.max_retries, config.retry_delay());
        Self {
            inner: Arc::new(Inner {
                config,
                endpoints,
                policy,
                transport,
                sleeper,
                batch: Mutex::new(Batch::default()),
                in_flight: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.inner.config
    }

    /// Submit a record.
    ///
    /// Malformed records are dropped. Never fails: delivery problems are
    /// logged and absorbed.
    pub async fn send(&self, record: TraceRecord) {
        if let Err(e) = record.validate() {
            if !self.inner.config.silent {
                tracing::warn!(error = %e, "Invalid trace data, dropping record");
            }
            return;
        }

        if self.inner.config.batching_enabled() {
            self.inner.enqueue(record);
        } else {
            self.inner.send_single(&record).await;
        }
    }

    /// Deliver one record now, with retry. Returns the collector's response body.
    pub async fn send_trace_with_retry(&self, record: &TraceRecord) -> Option<serde_json::Value> {
        self.inner.send_single(record).await
    }

    /// Deliver a batch now, with retry. Returns the collector's response body.
    pub async fn send_batch_with_retry(
        &self,
        records: &[TraceRecord],
    ) -> Option<serde_json::Value> {
        self.inner.send_batch(records).await
    }

    /// Flush whatever is buffered. The transmission runs in the background.
    pub fn flush(&self) {
        self.inner.flush();
    }

    /// Flush, then wait for every in-flight transmission to finish.
    ///
    /// Concurrent callers all wait for the same deliveries.
    pub async fn shutdown(&self) {
        self.inner.flush();
        let pending: Vec<_> = lock(&self.inner.in_flight)
            .iter()
            .map(|delivery| delivery.done.clone())
            .collect();
        join_all(pending).await;
        lock(&self.inner.in_flight).retain(|delivery| !delivery.task.is_finished());
    }

    /// Records waiting in the buffer.
    pub fn pending(&self) -> usize {
        lock(&self.inner.batch).records.len()
    }

    pub fn state(&self) -> SenderState {
        if self.pending() > 0 {
            return SenderState::Accumulating;
        }
        let flushing = lock(&self.inner.in_flight)
            .iter()
            .any(|delivery| !delivery.task.is_finished());
        if flushing {
            SenderState::Flushing
        } else {
            SenderState::Idle
        }
    }
}

#[async_trait]
impl TraceSink for BatchSender {
    async fn send(&self, record: TraceRecord) {
        BatchSender::send(self, record).await;
    }
}

impl Inner {
    fn enqueue(self: &Arc<Self>, record: TraceRecord) {
        let mut batch = lock(&self.batch);
        batch.records.push(record);

        if let Some(timer) = batch.timer.take() {
            timer.abort();
        }

        if batch.records.len() >= self.config.batch_size {
            let records = mem::take(&mut batch.records);
            drop(batch);
            self.spawn_delivery(records);
        } else {
            let inner = Arc::clone(self);
            let timeout = self.config.batch_timeout();
            batch.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                inner.flush();
            }));
        }
    }

    fn flush(self: &Arc<Self>) {
        let records = {
            let mut batch = lock(&self.batch);
            if let Some(timer) = batch.timer.take() {
                timer.abort();
            }
            mem::take(&mut batch.records)
        };

        if !records.is_empty() {
            self.spawn_delivery(records);
        }
    }

    fn spawn_delivery(self: &Arc<Self>, records: Vec<TraceRecord>) {
        tracing::debug!(count = records.len(), "Flushing trace batch");
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            inner.send_batch(&records).await;
        });
        let task = handle.abort_handle();
        let done = handle
            .map(|result| {
                if let Err(e) = result {
                    tracing::debug!(error = %e, "Trace delivery task did not complete");
                }
            })
            .boxed()
            .shared();

        let mut in_flight = lock(&self.in_flight);
        in_flight.retain(|delivery| !delivery.task.is_finished());
        in_flight.push(InFlight { task, done });
    }

    fn encode<T: serde::Serialize + ?Sized>(&self, payload: &T) -> Option<Bytes> {
        match serde_json::to_vec(payload) {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(e) => {
                if !self.config.silent {
                    tracing::warn!(error = %e, "Failed to serialize trace payload, dropping");
                }
                None
            }
        }
    }

    async fn send_single(&self, record: &TraceRecord) -> Option<serde_json::Value> {
        let payload = self.encode(record)?;
        let response = deliver_with_retry(
            self.transport.as_ref(),
            self.sleeper.as_ref(),
            self.policy,
            Delivery {
                kind: "trace",
                url: &self.endpoints.trace,
                payload,
                timeout: self.config.request_timeout(),
            },
            self.config.silent,
        )
        .await?;

        let body = response.json().unwrap_or(serde_json::Value::Null);
        if !self.config.silent {
            tracing::info!(
                trace_id = body.get("traceId").and_then(|v| v.as_str()).unwrap_or(record.trace_id.as_str()),
                "Trace sent successfully"
            );
        }
        Some(body)
    }

    async fn send_batch(&self, records: &[TraceRecord]) -> Option<serde_json::Value> {
        if records.is_empty() {
            return None;
        }
        let payload = self.encode(records)?;
        let response = deliver_with_retry(
            self.transport.as_ref(),
            self.sleeper.as_ref(),
            self.policy,
            Delivery {
                kind: "batch",
                url: &self.endpoints.batch,
                payload,
                timeout: self.config.batch_request_timeout(),
            },
            self.config.silent,
        )
        .await?;

        let body = response.json().unwrap_or(serde_json::Value::Null);
        if !self.config.silent {
            tracing::info!(
                count = body.get("count").and_then(|v| v.as_u64()).unwrap_or(records.len() as u64),
                "Batch sent successfully"
            );
        }
        Some(body)
    }
}
