use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::fault::classify::{classify, FatalCause, FaultKind, FaultSignature};

/// Failure of one entry's processing step, as seen by the job layer.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Defer the entry to a later pass; the job step should be retried as a whole.
    #[error("service interruption during {operation}: {message} (retry after {retry_after}, give up after {retry_until})")]
    Transient {
        operation: String,
        message: String,
        retry_after: DateTime<Utc>,
        retry_until: DateTime<Utc>,
    },

    /// The entry is unreachable or unauthorized; handled as a delete.
    #[error("{id} is no longer reachable: {reason}")]
    Absent { id: String, reason: String },

    #[error("crawl cancelled")]
    Cancelled,

    #[error("{operation} failed: {source}")]
    Fatal {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl CrawlError {
    /// Turn a failed remote call on `id` into the crawl-level taxonomy.
    pub fn from_failure(operation: &str, id: &str, err: anyhow::Error) -> Self {
        let signature = FaultSignature::from_error(&err);
        match classify(&signature) {
            FaultKind::Retryable {
                retry_after,
                retry_until,
            } => CrawlError::Transient {
                operation: operation.to_string(),
                message: signature.to_string(),
                retry_after,
                retry_until,
            },
            FaultKind::Skip => CrawlError::Absent {
                id: id.to_string(),
                reason: signature.to_string(),
            },
            FaultKind::Fatal(FatalCause::Cancelled) => CrawlError::Cancelled,
            FaultKind::Fatal(FatalCause::Unrecognized) => CrawlError::Fatal {
                operation: operation.to_string(),
                source: err,
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CrawlError::Transient { .. })
    }

    /// True for failures that should abort the current pass.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CrawlError::Cancelled | CrawlError::Fatal { .. } | CrawlError::Config(_)
        )
    }
}
