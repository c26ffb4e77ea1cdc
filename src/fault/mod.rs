//! Fault classification and bounded retries for remote calls.

pub mod classify;
pub mod error;
pub mod retry;

pub use classify::{classify, FatalCause, FaultCode, FaultKind, FaultRecord, FaultSignature};
pub use error::CrawlError;
pub use retry::{with_retry, Retrier, RetryPolicy};
