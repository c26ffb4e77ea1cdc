use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::io::AsyncReadExt;

use crate::crawl::fingerprint::Fingerprint;
use crate::store::ContentStream;
use crate::version::Version;

/// Why an entry was neither ingested nor deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum SkipReason {
    /// Included container; its children should be queued.
    Container { children: Vec<String> },
    /// Version token matches the previous pass.
    Unchanged,
}

/// Decision for one entry in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ingest {
        id: String,
        version: String,
        bytes: u64,
    },
    Delete {
        id: String,
        reason: String,
    },
    Skip {
        id: String,
        reason: SkipReason,
        version: String,
    },
}

impl Outcome {
    pub fn id(&self) -> &str {
        match self {
            Outcome::Ingest { id, .. } | Outcome::Delete { id, .. } | Outcome::Skip { id, .. } => id,
        }
    }

    /// Version token to remember for the next pass, if any.
    pub fn version(&self) -> Option<&str> {
        match self {
            Outcome::Ingest { version, .. } | Outcome::Skip { version, .. } => Some(version),
            Outcome::Delete { .. } => None,
        }
    }

    pub fn kind(&self) -> ActivityKind {
        match self {
            Outcome::Ingest { .. } => ActivityKind::Ingest,
            Outcome::Delete { .. } => ActivityKind::Delete,
            Outcome::Skip { .. } => ActivityKind::Skip,
        }
    }
}

/// Everything the job layer receives alongside ingested content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestRequest {
    pub id: String,
    pub version: String,
    pub metadata: Version,
    pub fingerprint: Option<Fingerprint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Ingest,
    Delete,
    Skip,
    Deferred,
    Failed,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Ingest => "ingest",
            ActivityKind::Delete => "delete",
            ActivityKind::Skip => "skip",
            ActivityKind::Deferred => "deferred",
            ActivityKind::Failed => "failed",
        }
    }
}

/// Observability record for one processed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityRecord {
    pub timestamp: DateTime<Utc>,
    pub id: String,
    pub outcome: ActivityKind,
    pub bytes: u64,
    pub error: Option<String>,
}

impl ActivityRecord {
    pub fn new(id: &str, outcome: ActivityKind) -> Self {
        Self {
            timestamp: Utc::now(),
            id: id.to_string(),
            outcome,
            bytes: 0,
            error: None,
        }
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = bytes;
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Job/queue layer that consumes the engine's decisions.
#[async_trait]
pub trait JobSink: Send + Sync {
    /// Hand over an entry's content; returns the number of bytes consumed.
    async fn ingest(&self, request: &IngestRequest, content: &mut ContentStream) -> Result<u64>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn skip(&self, id: &str, reason: &SkipReason) -> Result<()>;

    fn record_activity(&self, record: ActivityRecord);
}

/// Sink that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemorySinkState>,
}

#[derive(Debug, Default, Clone)]
pub struct MemorySinkState {
    pub ingested: BTreeMap<String, (IngestRequest, Vec<u8>)>,
    pub deleted: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
    pub activities: Vec<ActivityRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything received so far.
    pub fn snapshot(&self) -> MemorySinkState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    fn with_state(&self, f: impl FnOnce(&mut MemorySinkState)) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink lock poisoned"))?;
        f(&mut state);
        Ok(())
    }
}

#[async_trait]
impl JobSink for MemorySink {
    async fn ingest(&self, request: &IngestRequest, content: &mut ContentStream) -> Result<u64> {
        let mut data = Vec::new();
        content.read_to_end(&mut data).await?;
        let bytes = data.len() as u64;
        self.with_state(|state| {
            state.ingested.insert(request.id.clone(), (request.clone(), data));
        })?;
        Ok(bytes)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.with_state(|state| state.deleted.push(id.to_string()))
    }

    async fn skip(&self, id: &str, reason: &SkipReason) -> Result<()> {
        self.with_state(|state| state.skipped.push((id.to_string(), reason.clone())))
    }

    fn record_activity(&self, record: ActivityRecord) {
        if let Ok(mut state) = self.state.lock() {
            state.activities.push(record);
        }
    }
}
