//! Signature-based fault classification.
//!
//! Remote stores report failures through many layers (transport errors,
//! protocol status strings, wrapped I/O errors). Everything is reduced to a
//! [`FaultSignature`] and matched against one ordered table of known
//! signatures, so the heuristics live in a single place.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::io;

use crate::fault::error::CrawlError;

/// Earliest point a deferred entry should be retried, relative to the failure.
pub const RETRY_AFTER_MINUTES: i64 = 5;
/// Point after which a still-failing entry is given up on.
pub const RETRY_UNTIL_HOURS: i64 = 3;

const CANCELLED: &[&str] = &["cancelled", "canceled"];

const TRANSIENT: &[&str] = &[
    "busy",
    "interrupted",
    "handle is invalid",
    "no longer available",
    "parameter is incorrect",
    "timed out",
    "connection reset",
    "temporarily unavailable",
    "rate limited",
];

const ABSENT: &[&str] = &[
    "cannot find",
    "is denied",
    "no such file",
    "not found",
    "does not exist",
];

/// Structured failure category, when the error exposes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultCode {
    NotFound,
    PermissionDenied,
    /// Cooperative cancellation of the crawl, never an OS-level signal.
    Cancelled,
    TimedOut,
    ConnectionLost,
    Busy,
    Other,
}

impl From<io::ErrorKind> for FaultCode {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => FaultCode::NotFound,
            io::ErrorKind::PermissionDenied => FaultCode::PermissionDenied,
            // EINTR: the call itself may simply be repeated
            io::ErrorKind::Interrupted => FaultCode::Busy,
            io::ErrorKind::TimedOut => FaultCode::TimedOut,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected => FaultCode::ConnectionLost,
            io::ErrorKind::WouldBlock => FaultCode::Busy,
            _ => FaultCode::Other,
        }
    }
}

impl From<opendal::ErrorKind> for FaultCode {
    fn from(kind: opendal::ErrorKind) -> Self {
        match kind {
            opendal::ErrorKind::NotFound => FaultCode::NotFound,
            opendal::ErrorKind::PermissionDenied => FaultCode::PermissionDenied,
            opendal::ErrorKind::RateLimited => FaultCode::Busy,
            _ => FaultCode::Other,
        }
    }
}

/// (code, message, cause chain) describing one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultSignature {
    pub code: Option<FaultCode>,
    pub message: String,
    pub causes: Vec<String>,
}

impl FaultSignature {
    pub fn new(message: &str) -> Self {
        Self {
            code: None,
            message: message.to_string(),
            causes: Vec::new(),
        }
    }

    pub fn with_code(mut self, code: FaultCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_cause(mut self, cause: &str) -> Self {
        self.causes.push(cause.to_string());
        self
    }

    /// Reduce an error chain to a signature. The first cause that carries a
    /// structured code supplies it.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let mut code = None;
        let mut causes = Vec::new();

        for (depth, cause) in err.chain().enumerate() {
            if depth > 0 {
                causes.push(cause.to_string());
            }
            if code.is_some() {
                continue;
            }
            if let Some(crawl) = cause.downcast_ref::<CrawlError>() {
                if matches!(crawl, CrawlError::Cancelled) {
                    code = Some(FaultCode::Cancelled);
                }
            } else if let Some(io_err) = cause.downcast_ref::<io::Error>() {
                code = Some(FaultCode::from(io_err.kind()));
            } else if let Some(dal) = cause.downcast_ref::<opendal::Error>() {
                code = Some(if dal.is_temporary() {
                    FaultCode::Busy
                } else {
                    FaultCode::from(dal.kind())
                });
            }
        }

        Self {
            code,
            message: err.to_string(),
            causes,
        }
    }

    /// Key under which two failures count as "the same" for retry budgeting.
    pub fn equivalence_key(&self) -> String {
        format!("{:?}:{}", self.code, self.message.to_lowercase())
    }

    fn mentions(&self, needles: &[&str]) -> bool {
        std::iter::once(&self.message)
            .chain(self.causes.iter())
            .map(|text| text.to_lowercase())
            .any(|text| needles.iter().any(|needle| text.contains(needle)))
    }
}

impl fmt::Display for FaultSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{:?}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalCause {
    /// Cooperative shutdown; propagate without retrying.
    Cancelled,
    /// No known signature matched.
    Unrecognized,
}

/// Outcome of classifying a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Defer the whole entry; try again inside the window.
    Retryable {
        retry_after: DateTime<Utc>,
        retry_until: DateTime<Utc>,
    },
    /// The entry is gone or unreadable; treat it as deleted.
    Skip,
    Fatal(FatalCause),
}

impl FaultKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FaultKind::Retryable { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            FaultKind::Retryable { .. } => "retryable",
            FaultKind::Skip => "skip",
            FaultKind::Fatal(FatalCause::Cancelled) => "cancelled",
            FaultKind::Fatal(FatalCause::Unrecognized) => "fatal",
        }
    }
}

/// Classify a failure against the known signatures, relative to now.
pub fn classify(signature: &FaultSignature) -> FaultKind {
    classify_at(signature, Utc::now())
}

/// Classify a failure with retry windows measured from `now`.
pub fn classify_at(signature: &FaultSignature, now: DateTime<Utc>) -> FaultKind {
    let retryable = FaultKind::Retryable {
        retry_after: now + Duration::minutes(RETRY_AFTER_MINUTES),
        retry_until: now + Duration::hours(RETRY_UNTIL_HOURS),
    };

    match signature.code {
        Some(FaultCode::Cancelled) => return FaultKind::Fatal(FatalCause::Cancelled),
        Some(FaultCode::TimedOut | FaultCode::ConnectionLost | FaultCode::Busy) => return retryable,
        Some(FaultCode::NotFound | FaultCode::PermissionDenied) => return FaultKind::Skip,
        Some(FaultCode::Other) | None => {}
    }

    if signature.mentions(TRANSIENT) {
        retryable
    } else if signature.mentions(CANCELLED) {
        FaultKind::Fatal(FatalCause::Cancelled)
    } else if signature.mentions(ABSENT) {
        FaultKind::Skip
    } else {
        FaultKind::Fatal(FatalCause::Unrecognized)
    }
}

/// One observed failure of a remote call, tracked across retries of the
/// same logical operation.
#[derive(Debug, Clone)]
pub struct FaultRecord {
    pub operation: String,
    pub signature: FaultSignature,
    pub classification: FaultKind,
    pub attempt: u32,
    pub key: String,
}

impl FaultRecord {
    pub fn new(operation: &str, signature: FaultSignature, attempt: u32) -> Self {
        let classification = classify(&signature);
        let key = signature.equivalence_key();
        Self {
            operation: operation.to_string(),
            signature,
            classification,
            attempt,
            key,
        }
    }
}
