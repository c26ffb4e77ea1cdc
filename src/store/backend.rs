use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::io::AsyncRead;

use crate::store::types::AccessEntry;

/// Byte stream of an entry's content.
pub type ContentStream = Box<dyn AsyncRead + Unpin + Send>;

/// Stream of child identifiers.
pub type ChildStream = BoxStream<'static, Result<String>>;

/// Read-only view of a remote hierarchical store.
///
/// Identifiers are canonical `/`-separated paths. Every call is a single
/// remote round trip; callers wrap each one in a retry loop individually.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    async fn exists(&self, id: &str) -> Result<bool>;

    async fn is_container(&self, id: &str) -> Result<bool>;

    /// Last-modified time in milliseconds since the epoch.
    async fn last_modified(&self, id: &str) -> Result<i64>;

    /// Content length in bytes (0 for containers).
    async fn length(&self, id: &str) -> Result<u64>;

    /// Identifiers of the container's direct children.
    async fn list_children(&self, id: &str) -> Result<ChildStream>;

    async fn open_content(&self, id: &str) -> Result<ContentStream>;

    /// Entry-level ACEs, or `None` if the store has no ACL concept.
    async fn get_acl(&self, id: &str) -> Result<Option<Vec<AccessEntry>>>;

    /// Container-level (share) ACEs, or `None` if unavailable.
    async fn get_container_acl(&self, id: &str) -> Result<Option<Vec<AccessEntry>>>;

    /// Prefix stripped from identifiers when deriving paths and URIs.
    fn uri_prefix(&self) -> &str {
        ""
    }
}

/// Join a child name onto a parent identifier.
pub fn join_id(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    format!("{}/{}", parent, name.trim_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_id() {
        assert_eq!(join_id("/", "docs"), "/docs");
        assert_eq!(join_id("/docs", "a.pdf"), "/docs/a.pdf");
        assert_eq!(join_id("/docs/", "sub/"), "/docs/sub");
    }
}
