//! Per-entry crawl decisions.
//!
//! For each entry: check existence, describe it, apply the metadata-only
//! inclusion check, compute the version token, and then either skip it,
//! delete it, ingest it directly, or fetch and fingerprint it first when the
//! token says inclusion depends on content.

use anyhow::Context;
use futures::StreamExt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::crawl::fingerprint::{ContentSniffer, FingerprintActivity};
use crate::crawl::outcome::{
    ActivityKind, ActivityRecord, IngestRequest, JobSink, Outcome, SkipReason,
};
use crate::fault::{CrawlError, Retrier, RetryPolicy};
use crate::rules::RuleTree;
use crate::store::{ContentStream, Entry, EntryKind, StoreAdapter};
use crate::version::{decode_version, AclPolicy, AmbiguityFlag, VersionEncoder};

/// Decides and emits the outcome for individual entries.
///
/// Holds only shared read-only state, so one driver can serve any number of
/// concurrent entry tasks.
pub struct CrawlDriver {
    store: Arc<dyn StoreAdapter>,
    rules: Arc<RuleTree>,
    encoder: VersionEncoder,
    sink: Arc<dyn JobSink>,
    fingerprinter: Arc<dyn FingerprintActivity>,
    retrier: Retrier,
    scratch_dir: PathBuf,
}

impl CrawlDriver {
    pub fn new(
        store: Arc<dyn StoreAdapter>,
        rules: Arc<RuleTree>,
        encoder: VersionEncoder,
        sink: Arc<dyn JobSink>,
    ) -> Self {
        Self {
            store,
            rules,
            encoder,
            sink,
            fingerprinter: Arc::new(ContentSniffer::new()),
            retrier: Retrier::new(RetryPolicy::default(), CancellationToken::new()),
            scratch_dir: std::env::temp_dir(),
        }
    }

    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn FingerprintActivity>) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    pub fn with_retrier(mut self, retrier: Retrier) -> Self {
        self.retrier = retrier;
        self
    }

    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    pub fn rules(&self) -> &RuleTree {
        &self.rules
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        self.retrier.cancel_token()
    }

    /// Decide, emit and record the outcome for `id`.
    ///
    /// Permanent absence is reported as a delete. Transient failures come back
    /// as [`CrawlError::Transient`] so the caller can defer the entry.
    pub async fn process(&self, id: &str, previous: Option<&str>) -> Result<Outcome, CrawlError> {
        let result = match self.decide(id, previous).await {
            Err(CrawlError::Absent { id, reason }) => {
                debug!(id = %id, reason = %reason, "Entry unreachable, deleting");
                self.delete(&id, reason).await
            }
            other => other,
        };

        match &result {
            Ok(outcome) => {
                let bytes = match outcome {
                    Outcome::Ingest { bytes, .. } => *bytes,
                    _ => 0,
                };
                info!(id = %id, outcome = outcome.kind().as_str(), bytes, "Processed entry");
                self.sink
                    .record_activity(ActivityRecord::new(id, outcome.kind()).with_bytes(bytes));
            }
            Err(err) => {
                let kind = if err.is_retryable() {
                    ActivityKind::Deferred
                } else {
                    ActivityKind::Failed
                };
                self.sink
                    .record_activity(ActivityRecord::new(id, kind).with_error(err.to_string()));
            }
        }
        result
    }

    /// Delete an entry the previous pass knew about but this pass never reached.
    pub async fn retire(&self, id: &str) -> Result<Outcome, CrawlError> {
        let outcome = self.delete(id, "no longer reachable from seeds".to_string()).await?;
        self.sink
            .record_activity(ActivityRecord::new(id, ActivityKind::Delete));
        Ok(outcome)
    }

    /// Fetch the metadata the decision needs, or `None` if the entry is gone.
    /// Existence is checked before anything else.
    pub async fn describe(&self, id: &str) -> Result<Option<Entry>, CrawlError> {
        let store = &self.store;

        if !self.call("exists", id, move || store.exists(id)).await? {
            return Ok(None);
        }
        let kind = if self.call("is_container", id, move || store.is_container(id)).await? {
            EntryKind::Container
        } else {
            EntryKind::Leaf
        };
        let modified = self
            .call("last_modified", id, move || store.last_modified(id))
            .await?;
        let length = match kind {
            EntryKind::Container => 0,
            EntryKind::Leaf => self.call("length", id, move || store.length(id)).await?,
        };

        let acl = if self.encoder.entry_acl == AclPolicy::Native {
            self.call("get_acl", id, move || store.get_acl(id)).await?
        } else {
            None
        };
        let container_acl = if self.encoder.container_acl == AclPolicy::Native {
            self.call("get_container_acl", id, move || store.get_container_acl(id))
                .await?
        } else {
            None
        };

        Ok(Some(Entry {
            id: id.to_string(),
            kind,
            length,
            modified,
            acl,
            container_acl,
        }))
    }

    async fn decide(&self, id: &str, previous: Option<&str>) -> Result<Outcome, CrawlError> {
        let Some(entry) = self.describe(id).await? else {
            return self.delete(id, "no longer exists".to_string()).await;
        };

        if !self.rules.check_include(&entry) {
            return self.delete(id, "excluded by rules".to_string()).await;
        }

        let version = self
            .encoder
            .compute_version(&entry, &self.rules, self.store.uri_prefix());

        if entry.is_container() {
            let children = self.children(id).await?;
            let reason = SkipReason::Container { children };
            self.emit("skip", id, self.sink.skip(id, &reason)).await?;
            return Ok(Outcome::Skip {
                id: id.to_string(),
                reason,
                version,
            });
        }

        if previous == Some(version.as_str()) {
            let reason = SkipReason::Unchanged;
            self.emit("skip", id, self.sink.skip(id, &reason)).await?;
            return Ok(Outcome::Skip {
                id: id.to_string(),
                reason,
                version,
            });
        }

        self.ingest(&entry, version).await
    }

    /// Processing stage for a leaf whose version has been computed.
    pub async fn ingest(&self, entry: &Entry, version: String) -> Result<Outcome, CrawlError> {
        let metadata = decode_version(&version);

        match metadata.ambiguity {
            AmbiguityFlag::ForcedExclude => {
                self.delete(&entry.id, "excluded by rules".to_string()).await
            }
            AmbiguityFlag::ForcedInclude => {
                let store = &self.store;
                let id = entry.id.as_str();
                let mut content = self
                    .call("open_content", id, move || store.open_content(id))
                    .await?;
                let request = IngestRequest {
                    id: entry.id.clone(),
                    version: version.clone(),
                    metadata,
                    fingerprint: None,
                };
                let bytes = self
                    .emit("ingest", id, self.sink.ingest(&request, &mut content))
                    .await?;
                Ok(Outcome::Ingest {
                    id: entry.id.clone(),
                    version,
                    bytes,
                })
            }
            AmbiguityFlag::DependsOnFingerprint => {
                // Removed from disk when dropped, on every exit path
                let scratch = self.fetch_to_scratch(&entry.id).await?;
                let fingerprint = self
                    .fingerprinter
                    .fingerprint(scratch.path())
                    .await
                    .map_err(|err| CrawlError::from_failure("fingerprint", &entry.id, err))?;
                debug!(
                    id = %entry.id,
                    digest = %fingerprint.digest,
                    indexable = fingerprint.indexable,
                    "Fingerprinted entry"
                );

                if !self.rules.check_ingest(entry, &fingerprint) {
                    return self
                        .delete(&entry.id, "excluded after fingerprinting".to_string())
                        .await;
                }

                let file = tokio::fs::File::open(scratch.path())
                    .await
                    .context("Failed to reopen scratch copy")
                    .map_err(|err| CrawlError::from_failure("ingest", &entry.id, err))?;
                let mut content: ContentStream = Box::new(file);
                let request = IngestRequest {
                    id: entry.id.clone(),
                    version: version.clone(),
                    metadata,
                    fingerprint: Some(fingerprint),
                };
                let bytes = self
                    .emit("ingest", &entry.id, self.sink.ingest(&request, &mut content))
                    .await?;
                Ok(Outcome::Ingest {
                    id: entry.id.clone(),
                    version,
                    bytes,
                })
            }
        }
    }

    /// Child identifiers of a container, in listing order.
    pub async fn children(&self, id: &str) -> Result<Vec<String>, CrawlError> {
        let store = &self.store;
        self.call("list_children", id, move || async move {
            let mut stream = store.list_children(id).await?;
            let mut children = Vec::new();
            while let Some(child) = stream.next().await {
                children.push(child?);
            }
            Ok::<_, anyhow::Error>(children)
        })
        .await
    }

    async fn fetch_to_scratch(&self, id: &str) -> Result<NamedTempFile, CrawlError> {
        let scratch = tempfile::Builder::new()
            .prefix("sharecrawl-")
            .tempfile_in(&self.scratch_dir)
            .with_context(|| format!("Failed to create scratch file in {}", self.scratch_dir.display()))
            .map_err(|err| CrawlError::Fatal {
                operation: "scratch".to_string(),
                source: err,
            })?;

        let store = &self.store;
        let path = scratch.path();
        let copied = self
            .call("open_content", id, move || async move {
                let mut reader = store.open_content(id).await?;
                let mut file = tokio::fs::File::create(path).await?;
                let copied = tokio::io::copy(&mut reader, &mut file).await?;
                file.flush().await?;
                Ok::<_, anyhow::Error>(copied)
            })
            .await?;
        debug!(id = %id, bytes = copied, scratch = %path.display(), "Fetched scratch copy");
        Ok(scratch)
    }

    async fn delete(&self, id: &str, reason: String) -> Result<Outcome, CrawlError> {
        self.emit("delete", id, self.sink.delete(id)).await?;
        Ok(Outcome::Delete {
            id: id.to_string(),
            reason,
        })
    }

    /// One remote store call under the retry policy, classified on failure.
    async fn call<T, F, Fut>(&self, operation: &str, id: &str, op: F) -> Result<T, CrawlError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.retrier
            .run(operation, op)
            .await
            .map_err(|err| CrawlError::from_failure(operation, id, err))
    }

    /// Hand a decision to the job sink.
    async fn emit<T>(
        &self,
        operation: &str,
        id: &str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, CrawlError> {
        fut.await
            .map_err(|err| CrawlError::from_failure(operation, id, err))
    }
}
