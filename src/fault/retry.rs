//! Bounded retry loop around single remote calls.
//!
//! This is a tactic for flaky individual calls (an existence check that
//! occasionally reports "busy"), not the job-level deferral expressed by
//! [`CrawlError::Transient`]. Only failures classified as retryable are
//! retried. The consecutive-failure budget restarts whenever the failure
//! signature changes, while the total attempt budget never does.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::fault::classify::{FaultKind, FaultRecord, FaultSignature};
use crate::fault::error::CrawlError;

/// Retry budget for a single remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Attempts allowed in a row with an equivalent failure signature.
    pub max_consecutive: u32,
    /// First backoff delay; doubles per attempt.
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_consecutive: 3,
            backoff_ms: 250,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts.
    pub fn immediate() -> Self {
        Self {
            backoff_ms: 0,
            max_backoff_ms: 0,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor).min(self.max_backoff_ms))
    }
}

/// Runs remote calls under a [`RetryPolicy`], cut short by cancellation.
#[derive(Debug, Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Retrier {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Call `op` until it succeeds, fails with a non-retryable error, or the
    /// budget runs out. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        let mut consecutive = 0u32;
        let mut last_key: Option<String> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Err(CrawlError::Cancelled.into());
            }
            attempt += 1;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let record = FaultRecord::new(operation, FaultSignature::from_error(&err), attempt);
            if !matches!(record.classification, FaultKind::Retryable { .. }) {
                return Err(err);
            }

            if last_key.as_deref() != Some(record.key.as_str()) {
                consecutive = 0;
            }
            consecutive += 1;

            if attempt >= self.policy.max_attempts || consecutive >= self.policy.max_consecutive {
                return Err(err);
            }

            let delay = self.policy.backoff(attempt);
            warn!(
                operation = %record.operation,
                attempt = record.attempt,
                consecutive,
                signature = %record.signature,
                classification = record.classification.label(),
                delay_ms = delay.as_millis() as u64,
                "Transient failure, retrying"
            );
            last_key = Some(record.key);

            if !delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(CrawlError::Cancelled.into()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

/// Run `op` under `policy` with no cancellation source.
pub async fn with_retry<T, F, Fut>(operation: &str, policy: RetryPolicy, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    Retrier::new(policy, CancellationToken::new())
        .run(operation, op)
        .await
}
