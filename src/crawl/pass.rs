//! One crawl pass: breadth-first over the seeds, bounded concurrency.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::crawl::driver::CrawlDriver;
use crate::crawl::outcome::{Outcome, SkipReason};
use crate::fault::CrawlError;

/// Entry left for a later pass after a service interruption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deferred {
    pub id: String,
    pub message: String,
    pub retry_after: DateTime<Utc>,
    pub retry_until: DateTime<Utc>,
}

/// Summary of a finished pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub ingested: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub unchanged: usize,
    pub bytes: u64,
    pub deferred: Vec<Deferred>,
    /// Version tokens to hand to the next pass.
    pub versions: BTreeMap<String, String>,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

impl PassReport {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Ingest { bytes, .. } => {
                self.ingested += 1;
                self.bytes += bytes;
            }
            Outcome::Delete { .. } => self.deleted += 1,
            Outcome::Skip {
                reason: SkipReason::Unchanged,
                ..
            } => self.unchanged += 1,
            Outcome::Skip { .. } => self.skipped += 1,
        }
        if let Some(version) = outcome.version() {
            self.versions.insert(outcome.id().to_string(), version.to_string());
        }
    }
}

/// Entries of `previous` that lie strictly below `id`.
fn descendants<'a>(
    previous: &'a BTreeMap<String, String>,
    id: &str,
) -> impl Iterator<Item = (&'a String, &'a String)> + 'a {
    let prefix = format!("{}/", id.trim_end_matches('/'));
    previous
        .range(prefix.clone()..)
        .take_while(move |(child, _)| child.starts_with(&prefix))
        .filter(|(child, _)| child.len() > 1)
}

/// Drives a [`CrawlDriver`] over everything reachable from a set of seeds.
pub struct CrawlPass {
    driver: Arc<CrawlDriver>,
    workers: usize,
    cancel: CancellationToken,
}

impl CrawlPass {
    pub fn new(driver: Arc<CrawlDriver>, workers: usize) -> Self {
        let cancel = driver.cancel_token().clone();
        Self {
            driver,
            workers: workers.max(1),
            cancel,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Process `seeds` and every child they lead to.
    ///
    /// `previous` maps identifiers to the version tokens recorded by the last
    /// pass. Entries it names that were not reached this time are deleted.
    /// A fatal error or cancellation aborts the pass.
    pub async fn run(
        &self,
        seeds: &[String],
        previous: &BTreeMap<String, String>,
    ) -> Result<PassReport, CrawlError> {
        let started = Instant::now();
        let mut report = PassReport::default();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut frontier: Vec<String> = seeds
            .iter()
            .filter(|id| seen.insert(id.to_string()))
            .cloned()
            .collect();

        info!(seeds = frontier.len(), workers = self.workers, "Starting crawl pass");

        while !frontier.is_empty() {
            if self.cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }
            debug!(entries = frontier.len(), "Processing crawl level");

            let driver = &self.driver;
            let results: Vec<(String, Result<Outcome, CrawlError>)> = stream::iter(frontier)
                .map(|id| {
                    let prev = previous.get(&id).cloned();
                    async move {
                        let result = driver.process(&id, prev.as_deref()).await;
                        (id, result)
                    }
                })
                .buffer_unordered(self.workers)
                .collect()
                .await;

            let mut next = Vec::new();
            for (id, result) in results {
                match result {
                    Ok(outcome) => {
                        if let Outcome::Skip {
                            reason: SkipReason::Container { children },
                            ..
                        } = &outcome
                        {
                            next.extend(children.iter().filter(|child| seen.insert(child.to_string())).cloned());
                        }
                        report.record(&outcome);
                    }
                    Err(CrawlError::Transient {
                        message,
                        retry_after,
                        retry_until,
                        ..
                    }) => {
                        warn!(id = %id, message = %message, "Deferring entry to a later pass");
                        if let Some(version) = previous.get(&id) {
                            report.versions.insert(id.clone(), version.clone());
                        }
                        // Everything below a deferred entry is deferred with it
                        for (child, version) in descendants(previous, &id) {
                            seen.insert(child.clone());
                            report.versions.insert(child.clone(), version.clone());
                        }
                        report.deferred.push(Deferred {
                            id,
                            message,
                            retry_after,
                            retry_until,
                        });
                    }
                    Err(err) => return Err(err),
                }
            }
            // Deterministic order for the next level
            next.sort();
            frontier = next;
        }

        let orphans: Vec<&String> = previous.keys().filter(|id| !seen.contains(*id)).collect();
        for id in orphans {
            if self.cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }
            let outcome = self.driver.retire(id).await?;
            report.record(&outcome);
        }

        report.duration = started.elapsed();
        info!(
            ingested = report.ingested,
            deleted = report.deleted,
            skipped = report.skipped,
            unchanged = report.unchanged,
            deferred = report.deferred.len(),
            bytes = report.bytes,
            "Crawl pass finished"
        );
        Ok(report)
    }
}
