// Shared fixtures for integration tests
// In-memory store adapter with scripted failures

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use sharecrawl::store::{AccessEntry, ChildStream, ContentStream, StoreAdapter};

#[derive(Debug, Clone)]
pub struct FakeNode {
    pub container: bool,
    pub content: Vec<u8>,
    pub modified: i64,
    pub acl: Option<Vec<AccessEntry>>,
}

/// Store backed by a map of identifier to node.
///
/// `fail(operation, id, message)` queues an error for the next call of that
/// operation on that identifier; queued errors are consumed in order.
#[derive(Default)]
pub struct FakeStore {
    nodes: Mutex<BTreeMap<String, FakeNode>>,
    failures: Mutex<HashMap<(String, String), VecDeque<String>>>,
    calls: AtomicUsize,
    container_acl: Option<Vec<AccessEntry>>,
}

impl FakeStore {
    pub fn new() -> Self {
        let store = Self::default();
        store.add_container("/");
        store
    }

    pub fn with_container_acl(mut self, acl: Vec<AccessEntry>) -> Self {
        self.container_acl = Some(acl);
        self
    }

    pub fn add_container(&self, id: &str) {
        self.nodes.lock().unwrap().insert(
            id.to_string(),
            FakeNode {
                container: true,
                content: Vec::new(),
                modified: 1_000,
                acl: None,
            },
        );
    }

    pub fn add_file(&self, id: &str, content: &[u8], modified: i64) {
        self.add_file_with_acl(id, content, modified, None);
    }

    pub fn add_file_with_acl(&self, id: &str, content: &[u8], modified: i64, acl: Option<Vec<AccessEntry>>) {
        self.nodes.lock().unwrap().insert(
            id.to_string(),
            FakeNode {
                container: false,
                content: content.to_vec(),
                modified,
                acl,
            },
        );
    }

    pub fn remove(&self, id: &str) {
        self.nodes.lock().unwrap().remove(id);
    }

    pub fn fail(&self, operation: &str, id: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .entry((operation.to_string(), id.to_string()))
            .or_default()
            .push_back(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, operation: &str, id: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = (operation.to_string(), id.to_string());
        match self.failures.lock().unwrap().get_mut(&key).and_then(|queue| queue.pop_front()) {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }

    fn node(&self, id: &str) -> Result<FakeNode> {
        self.nodes
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("The system cannot find the file specified: {}", id))
    }
}

#[async_trait]
impl StoreAdapter for FakeStore {
    async fn exists(&self, id: &str) -> Result<bool> {
        self.enter("exists", id)?;
        Ok(self.nodes.lock().unwrap().contains_key(id))
    }

    async fn is_container(&self, id: &str) -> Result<bool> {
        self.enter("is_container", id)?;
        Ok(self.node(id)?.container)
    }

    async fn last_modified(&self, id: &str) -> Result<i64> {
        self.enter("last_modified", id)?;
        Ok(self.node(id)?.modified)
    }

    async fn length(&self, id: &str) -> Result<u64> {
        self.enter("length", id)?;
        Ok(self.node(id)?.content.len() as u64)
    }

    async fn list_children(&self, id: &str) -> Result<ChildStream> {
        self.enter("list_children", id)?;
        let prefix = if id.ends_with('/') {
            id.to_string()
        } else {
            format!("{}/", id)
        };
        let children: Vec<String> = self
            .nodes
            .lock()
            .unwrap()
            .keys()
            .filter(|key| {
                key.len() > prefix.len()
                    && key.starts_with(&prefix)
                    && !key[prefix.len()..].contains('/')
            })
            .cloned()
            .collect();
        Ok(stream::iter(children).map(Ok).boxed())
    }

    async fn open_content(&self, id: &str) -> Result<ContentStream> {
        self.enter("open_content", id)?;
        Ok(Box::new(Cursor::new(self.node(id)?.content)))
    }

    async fn get_acl(&self, id: &str) -> Result<Option<Vec<AccessEntry>>> {
        self.enter("get_acl", id)?;
        Ok(self.node(id)?.acl)
    }

    async fn get_container_acl(&self, id: &str) -> Result<Option<Vec<AccessEntry>>> {
        self.enter("get_container_acl", id)?;
        Ok(self.container_acl.clone())
    }
}
