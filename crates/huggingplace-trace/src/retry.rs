//! Delivery with bounded exponential backoff.
//!
//! Written as a plain loop over an attempt counter; the wait between attempts
//! goes through [`Sleeper`] so the schedule can be observed without real time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TraceError;
use crate::transport::{STATUS_CREATED, Transport, TransportResponse};

/// Waits between retry attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Shared sleeper handle.
pub type SharedSleeper = Arc<dyn Sleeper>;

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Wait before the first retry; doubles each time.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay after failed attempt `attempt` (counting from zero).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Attempts made before a payload is dropped.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// One payload bound for one endpoint.
#[derive(Debug, Clone)]
pub struct Delivery<'a> {
    /// What is being sent, for diagnostics ("trace" or "batch").
    pub kind: &'static str,
    pub url: &'a str,
    pub payload: Bytes,
    pub timeout: Duration,
}

/// POST `delivery` until the collector answers `201` or attempts run out.
///
/// Returns the accepted response, or `None` once the payload has been dropped.
/// Never returns an error: failures are logged here (unless `silent`) and end
/// at this boundary.
pub async fn deliver_with_retry(
    transport: &dyn Transport,
    sleeper: &dyn Sleeper,
    policy: RetryPolicy,
    delivery: Delivery<'_>,
    silent: bool,
) -> Option<TransportResponse> {
    let mut attempt: u32 = 0;

    loop {
        let error = match transport
            .post(delivery.url, delivery.payload.clone(), delivery.timeout)
            .await
        {
            Ok(response) if response.status == STATUS_CREATED => return Some(response),
            Ok(response) => TraceError::UnexpectedStatus {
                status: response.status,
            },
            Err(e) => e,
        };

        if !silent {
            tracing::warn!(
                kind = delivery.kind,
                attempt = attempt + 1,
                error = %error,
                "Failed to send {}",
                delivery.kind
            );
        }

        if attempt >= policy.max_retries {
            if !silent {
                tracing::warn!(
                    kind = delivery.kind,
                    attempts = attempt + 1,
                    "Max retries reached, dropping {}",
                    delivery.kind
                );
            }
            return None;
        }

        let backoff = policy.backoff(attempt);
        if !silent {
            tracing::info!(
                kind = delivery.kind,
                backoff_ms = backoff.as_millis() as u64,
                "Retrying {} after backoff",
                delivery.kind
            );
        }
        sleeper.sleep(backoff).await;
        attempt += 1;
    }
}
