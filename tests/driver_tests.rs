// Tests for the crawl driver
// Per-entry decisions against an in-memory store

mod common;

use common::FakeStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use sharecrawl::crawl::{ActivityKind, CrawlDriver, MemorySink, Outcome, SkipReason};
use sharecrawl::fault::{CrawlError, Retrier, RetryPolicy};
use sharecrawl::rules::{Indexable, Rule, RuleTree, Scope};
use sharecrawl::store::{AccessEntry, EntryKind, LocalStore, READ_DATA};
use sharecrawl::version::{
    decode_version, AclPair, AclPolicy, AmbiguityFlag, PathAttribute, UriMapping, VersionEncoder,
    FAIL_CLOSED_PRINCIPAL,
};

const PDF: &[u8] = b"%PDF-1.4\nQuarterly report: revenue is up.\n";

fn pdf_tree(indexable: Indexable) -> RuleTree {
    RuleTree::new().scope(
        Scope::new("/docs").rule(
            Rule::include("*.pdf")
                .with_kind(EntryKind::Leaf)
                .with_indexable(indexable),
        ),
    )
}

fn native_entry_acl() -> VersionEncoder {
    VersionEncoder::new(AclPolicy::Disabled, AclPolicy::Native, UriMapping::default())
}

fn docs_store() -> Arc<FakeStore> {
    let store = FakeStore::new();
    store.add_container("/docs");
    store.add_file_with_acl(
        "/docs/report.pdf",
        PDF,
        1_700_000_000_000,
        Some(vec![AccessEntry::allow("S-1-1-0", READ_DATA)]),
    );
    Arc::new(store)
}

fn driver(store: Arc<FakeStore>, tree: RuleTree, sink: Arc<MemorySink>) -> CrawlDriver {
    CrawlDriver::new(store, Arc::new(tree), native_entry_acl(), sink).with_retrier(Retrier::new(
        RetryPolicy::immediate(),
        CancellationToken::new(),
    ))
}

#[tokio::test]
async fn test_included_pdf_is_ingested_with_native_acl() {
    let sink = Arc::new(MemorySink::new());
    let driver = driver(docs_store(), pdf_tree(Indexable::Any), sink.clone());

    let outcome = driver.process("/docs/report.pdf", None).await.unwrap();
    let Outcome::Ingest { version, bytes, .. } = &outcome else {
        panic!("expected ingest, got {:?}", outcome);
    };
    assert_eq!(*bytes, PDF.len() as u64);

    let decoded = decode_version(version);
    assert_eq!(
        decoded.entry_acl,
        Some(AclPair {
            allow: vec!["S-1-1-0".to_string()],
            deny: vec![FAIL_CLOSED_PRINCIPAL.to_string()],
        })
    );
    assert_eq!(decoded.container_acl, None);
    assert_eq!(decoded.ambiguity, AmbiguityFlag::ForcedInclude);
    assert_eq!(decoded.length, PDF.len() as u64);
    assert_eq!(decoded.modified, 1_700_000_000_000);

    let state = sink.snapshot();
    let (request, content) = &state.ingested["/docs/report.pdf"];
    assert_eq!(content.as_slice(), PDF);
    assert!(request.fingerprint.is_none());
    assert_eq!(request.metadata, decoded);
    assert_eq!(state.activities.len(), 1);
    assert_eq!(state.activities[0].outcome, ActivityKind::Ingest);
}

#[tokio::test]
async fn test_unindexable_only_rule_deletes_textual_pdf_after_fingerprint() {
    let scratch = tempfile::tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let tree = pdf_tree(Indexable::No);

    let entry = sharecrawl::store::Entry::leaf("/docs/report.pdf", PDF.len() as u64, 0);
    assert!(tree.check_include(&entry));

    let driver = driver(docs_store(), tree, sink.clone()).with_scratch_dir(scratch.path());
    let outcome = driver.process("/docs/report.pdf", None).await.unwrap();
    assert!(matches!(outcome, Outcome::Delete { .. }), "got {:?}", outcome);

    let state = sink.snapshot();
    assert_eq!(state.deleted, vec!["/docs/report.pdf"]);
    assert!(state.ingested.is_empty());

    // Scratch copy is gone once the decision is made
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_indexable_only_rule_ingests_with_fingerprint() {
    let scratch = tempfile::tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let driver = driver(docs_store(), pdf_tree(Indexable::Yes), sink.clone())
        .with_scratch_dir(scratch.path());

    let outcome = driver.process("/docs/report.pdf", None).await.unwrap();
    let Outcome::Ingest { version, .. } = &outcome else {
        panic!("expected ingest, got {:?}", outcome);
    };
    assert_eq!(
        decode_version(version).ambiguity,
        AmbiguityFlag::DependsOnFingerprint
    );

    let state = sink.snapshot();
    let (request, content) = &state.ingested["/docs/report.pdf"];
    assert_eq!(content.as_slice(), PDF);
    let fingerprint = request.fingerprint.as_ref().unwrap();
    assert!(fingerprint.indexable);
    assert_eq!(fingerprint.digest, blake3::hash(PDF).to_hex().to_string());
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_binary_content_excluded_by_indexable_rule() {
    let store = docs_store();
    store.add_file("/docs/blob.pdf", &[0u8, 1, 2, 3, 4, 5, 0xFF, 0xFE], 5);
    let sink = Arc::new(MemorySink::new());
    let driver = driver(store, pdf_tree(Indexable::Yes), sink.clone());

    let outcome = driver.process("/docs/blob.pdf", None).await.unwrap();
    assert!(matches!(outcome, Outcome::Delete { .. }));
    assert!(sink.snapshot().ingested.is_empty());
}

#[tokio::test]
async fn test_excluded_and_missing_entries_are_deleted() {
    let store = docs_store();
    store.add_file("/docs/notes.txt", b"notes", 5);
    let sink = Arc::new(MemorySink::new());
    let driver = driver(store.clone(), pdf_tree(Indexable::Any), sink.clone());

    let outcome = driver.process("/docs/notes.txt", None).await.unwrap();
    assert!(matches!(outcome, Outcome::Delete { ref reason, .. } if reason.contains("excluded")));

    let outcome = driver.process("/docs/gone.pdf", None).await.unwrap();
    assert!(matches!(outcome, Outcome::Delete { ref reason, .. } if reason.contains("no longer exists")));

    // Existence is checked before anything else
    assert_eq!(store.calls(), 5 + 1);
    assert_eq!(sink.snapshot().deleted, vec!["/docs/notes.txt", "/docs/gone.pdf"]);
}

#[tokio::test]
async fn test_container_lists_children() {
    let store = docs_store();
    store.add_file("/docs/b.pdf", PDF, 2);
    let sink = Arc::new(MemorySink::new());
    let driver = driver(store, pdf_tree(Indexable::Any), sink.clone());

    let outcome = driver.process("/docs", None).await.unwrap();
    match outcome {
        Outcome::Skip {
            reason: SkipReason::Container { children },
            ..
        } => assert_eq!(children, vec!["/docs/b.pdf", "/docs/report.pdf"]),
        other => panic!("expected container skip, got {:?}", other),
    }
    assert_eq!(sink.snapshot().skipped.len(), 1);
}

#[tokio::test]
async fn test_unchanged_version_is_skipped_without_fetching() {
    let store = docs_store();
    let sink = Arc::new(MemorySink::new());
    let driver = driver(store.clone(), pdf_tree(Indexable::Any), sink.clone());

    let first = driver.process("/docs/report.pdf", None).await.unwrap();
    let version = first.version().unwrap().to_string();

    store.fail("open_content", "/docs/report.pdf", "mystery failure");
    let second = driver
        .process("/docs/report.pdf", Some(&version))
        .await
        .unwrap();
    assert!(matches!(
        second,
        Outcome::Skip {
            reason: SkipReason::Unchanged,
            ..
        }
    ));
    assert_eq!(second.version(), Some(version.as_str()));

    // A touched entry gets a new token and is ingested again
    store.add_file_with_acl(
        "/docs/report.pdf",
        PDF,
        1_800_000_000_000,
        Some(vec![AccessEntry::allow("S-1-1-0", READ_DATA)]),
    );
    // The failure queued above is hit only now that content is fetched
    let err = driver.process("/docs/report.pdf", Some(&version)).await.unwrap_err();
    assert!(err.is_fatal());
    let third = driver.process("/docs/report.pdf", Some(&version)).await.unwrap();
    assert!(matches!(third, Outcome::Ingest { .. }));
}

#[tokio::test]
async fn test_flaky_existence_check_is_retried() {
    let store = docs_store();
    store.fail("exists", "/docs/report.pdf", "The pipe is busy");
    store.fail("exists", "/docs/report.pdf", "The pipe is busy");
    let sink = Arc::new(MemorySink::new());
    let driver = driver(store, pdf_tree(Indexable::Any), sink.clone());

    let outcome = driver.process("/docs/report.pdf", None).await.unwrap();
    assert!(matches!(outcome, Outcome::Ingest { .. }));
}

#[tokio::test]
async fn test_persistent_service_interruption_defers_entry() {
    let store = docs_store();
    for _ in 0..10 {
        store.fail("length", "/docs/report.pdf", "The network name is no longer available");
    }
    let sink = Arc::new(MemorySink::new());
    let driver = driver(store, pdf_tree(Indexable::Any), sink.clone());

    let err = driver.process("/docs/report.pdf", None).await.unwrap_err();
    match &err {
        CrawlError::Transient {
            operation,
            retry_after,
            retry_until,
            ..
        } => {
            assert_eq!(operation, "length");
            assert!(retry_after < retry_until);
        }
        other => panic!("expected transient error, got {:?}", other),
    }

    let state = sink.snapshot();
    assert!(state.ingested.is_empty());
    assert_eq!(state.activities[0].outcome, ActivityKind::Deferred);
    assert!(state.activities[0].error.is_some());
}

#[tokio::test]
async fn test_access_denied_becomes_delete() {
    let store = docs_store();
    store.fail("get_acl", "/docs/report.pdf", "Access is denied");
    let sink = Arc::new(MemorySink::new());
    let driver = driver(store, pdf_tree(Indexable::Any), sink.clone());

    let outcome = driver.process("/docs/report.pdf", None).await.unwrap();
    assert!(matches!(outcome, Outcome::Delete { .. }));
    assert_eq!(sink.snapshot().deleted, vec!["/docs/report.pdf"]);
}

#[tokio::test]
async fn test_unrecognized_failure_is_fatal() {
    let store = docs_store();
    store.fail("is_container", "/docs/report.pdf", "disk controller exploded");
    let sink = Arc::new(MemorySink::new());
    let driver = driver(store, pdf_tree(Indexable::Any), sink.clone());

    let err = driver.process("/docs/report.pdf", None).await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(sink.snapshot().activities[0].outcome, ActivityKind::Failed);
}

#[tokio::test]
async fn test_acls_not_fetched_when_security_is_off() {
    let store = docs_store();
    store.fail("get_acl", "/docs/report.pdf", "disk controller exploded");
    store.fail("get_container_acl", "/docs/report.pdf", "disk controller exploded");
    let sink = Arc::new(MemorySink::new());
    let driver = CrawlDriver::new(
        store,
        Arc::new(pdf_tree(Indexable::Any)),
        VersionEncoder::default(),
        sink,
    );

    let outcome = driver.process("/docs/report.pdf", None).await.unwrap();
    let decoded = decode_version(outcome.version().unwrap());
    assert_eq!(decoded.entry_acl, None);
    assert_eq!(decoded.container_acl, None);
}

#[tokio::test]
async fn test_forced_container_acl() {
    let sink = Arc::new(MemorySink::new());
    let encoder = VersionEncoder::new(
        AclPolicy::Forced(vec!["S-1-5-32-544".to_string()]),
        AclPolicy::Disabled,
        UriMapping::default(),
    );
    let driver = CrawlDriver::new(docs_store(), Arc::new(pdf_tree(Indexable::Any)), encoder, sink);

    let outcome = driver.process("/docs/report.pdf", None).await.unwrap();
    let decoded = decode_version(outcome.version().unwrap());
    let container = decoded.container_acl.unwrap();
    assert_eq!(container.allow, vec!["S-1-5-32-544"]);
    assert_eq!(container.deny, vec![FAIL_CLOSED_PRINCIPAL]);
}

#[tokio::test]
async fn test_native_container_acl_and_path_attribute() {
    let store = FakeStore::new().with_container_acl(vec![
        AccessEntry::allow("S-1-5-32-545", READ_DATA),
        AccessEntry::allow("S-1-1-0", READ_DATA),
    ]);
    store.add_container("/docs");
    store.add_file("/docs/report.pdf", PDF, 1_700_000_000_000);

    let mapping = UriMapping {
        path_attribute: Some("source-path".to_string()),
        ..UriMapping::default()
    };
    let encoder = VersionEncoder::new(AclPolicy::Native, AclPolicy::Disabled, mapping);
    let sink = Arc::new(MemorySink::new());
    let driver = CrawlDriver::new(
        Arc::new(store),
        Arc::new(pdf_tree(Indexable::Any)),
        encoder,
        sink.clone(),
    );

    let outcome = driver.process("/docs/report.pdf", None).await.unwrap();
    let Outcome::Ingest { version, .. } = &outcome else {
        panic!("expected ingest, got {:?}", outcome);
    };
    let decoded = decode_version(version);
    assert_eq!(
        decoded.container_acl,
        Some(AclPair {
            allow: vec!["S-1-1-0".to_string(), "S-1-5-32-545".to_string()],
            deny: vec![FAIL_CLOSED_PRINCIPAL.to_string()],
        })
    );
    assert_eq!(decoded.entry_acl, None);
    assert_eq!(
        decoded.path_attribute,
        Some(PathAttribute {
            name: "source-path".to_string(),
            value: "/docs/report.pdf".to_string(),
        })
    );
    assert_eq!(sink.snapshot().ingested["/docs/report.pdf"].0.metadata, decoded);
}

#[tokio::test]
async fn test_identifier_escaping_root_is_deleted_not_deferred() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let driver = CrawlDriver::new(
        Arc::new(LocalStore::new(dir.path())),
        Arc::new(RuleTree::new().scope(Scope::new("/").rule(Rule::include("*")))),
        VersionEncoder::default(),
        sink.clone(),
    )
    .with_retrier(Retrier::new(RetryPolicy::immediate(), CancellationToken::new()));

    let outcome = driver.process("/../etc/passwd", None).await.unwrap();
    assert!(matches!(outcome, Outcome::Delete { .. }), "got {:?}", outcome);
    assert_eq!(sink.snapshot().deleted, vec!["/../etc/passwd"]);
}
