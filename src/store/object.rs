use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use futures::stream::{self, StreamExt};
use opendal::{services::Memory, ErrorKind, Metadata, Operator};
use std::io::Cursor;

use crate::store::backend::{ChildStream, ContentStream, StoreAdapter};
use crate::store::types::AccessEntry;

/// Object storage (S3, GCS, memory, ...) exposed through OpenDAL.
///
/// Object stores have no real directories: a "container" is any prefix with
/// objects beneath it, and there are no ACLs to report.
pub struct ObjectStore {
    operator: Operator,
}

impl ObjectStore {
    pub fn new(operator: Operator) -> Self {
        Self { operator }
    }

    /// In-process store, mainly for tests and dry runs.
    pub fn memory() -> Result<Self> {
        let operator = Operator::new(Memory::default())?.finish();
        Ok(Self::new(operator))
    }

    /// Write an object, creating intermediate prefixes implicitly.
    pub async fn put(&self, id: &str, data: Vec<u8>) -> Result<()> {
        self.operator
            .write(&object_path(id), data)
            .await
            .with_context(|| format!("Failed to write object {}", id))?;
        Ok(())
    }

    /// Metadata for an object, or for the prefix if no object has that exact key.
    async fn stat_any(&self, id: &str) -> Result<Option<Metadata>> {
        let path = object_path(id);
        if path.is_empty() {
            return Ok(None);
        }
        match self.operator.stat(&path).await {
            Ok(meta) => return Ok(Some(meta)),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err).with_context(|| format!("Failed to stat object {}", id)),
        }
        match self.operator.stat(&prefix_path(id)).await {
            Ok(meta) => Ok(Some(meta)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("Failed to stat prefix {}", id)),
        }
    }

    async fn stat_existing(&self, id: &str) -> Result<Metadata> {
        match self.stat_any(id).await? {
            Some(meta) => Ok(meta),
            None if object_path(id).is_empty() => Ok(Metadata::new(opendal::EntryMode::DIR)),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("The system cannot find the object {}", id),
            )
            .into()),
        }
    }
}

#[async_trait]
impl StoreAdapter for ObjectStore {
    async fn exists(&self, id: &str) -> Result<bool> {
        if object_path(id).is_empty() {
            return Ok(true);
        }
        Ok(self.stat_any(id).await?.is_some())
    }

    async fn is_container(&self, id: &str) -> Result<bool> {
        Ok(self.stat_existing(id).await?.mode().is_dir())
    }

    async fn last_modified(&self, id: &str) -> Result<i64> {
        let meta = self.stat_existing(id).await?;
        Ok(meta
            .last_modified()
            .and_then(|modified| parse_timestamp(&modified.to_string()))
            .unwrap_or_default())
    }

    async fn length(&self, id: &str) -> Result<u64> {
        let meta = self.stat_existing(id).await?;
        Ok(if meta.mode().is_dir() { 0 } else { meta.content_length() })
    }

    async fn list_children(&self, id: &str) -> Result<ChildStream> {
        let prefix = prefix_path(id);
        let entries = self
            .operator
            .list(&prefix)
            .await
            .with_context(|| format!("Failed to list prefix {}", id))?;

        let mut children: Vec<String> = entries
            .into_iter()
            .map(|entry| entry.path().trim_end_matches('/').to_string())
            .filter(|path| !path.is_empty() && format!("{}/", path) != prefix)
            .map(|path| format!("/{}", path))
            .collect();
        children.sort();
        children.dedup();

        Ok(stream::iter(children).map(Ok).boxed())
    }

    async fn open_content(&self, id: &str) -> Result<ContentStream> {
        let content = self
            .operator
            .read(&object_path(id))
            .await
            .with_context(|| format!("Failed to read object {}", id))?;
        Ok(Box::new(Cursor::new(content.to_vec())))
    }

    async fn get_acl(&self, _id: &str) -> Result<Option<Vec<AccessEntry>>> {
        Ok(None)
    }

    async fn get_container_acl(&self, _id: &str) -> Result<Option<Vec<AccessEntry>>> {
        Ok(None)
    }
}

fn object_path(id: &str) -> String {
    id.trim_matches('/').to_string()
}

fn prefix_path(id: &str) -> String {
    let path = object_path(id);
    if path.is_empty() {
        path
    } else {
        format!("{}/", path)
    }
}

/// Parse an RFC 3339 or `YYYY-MM-DD HH:MM:SS[.f] UTC` timestamp into epoch millis.
fn parse_timestamp(value: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.timestamp_millis());
    }
    let trimmed = value.trim_end_matches(" UTC");
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_paths() {
        assert_eq!(object_path("/docs/a.pdf"), "docs/a.pdf");
        assert_eq!(prefix_path("/docs"), "docs/");
        assert_eq!(prefix_path("/"), "");
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("1970-01-01T00:00:01Z"), Some(1_000));
        assert_eq!(parse_timestamp("1970-01-01 00:00:02 UTC"), Some(2_000));
        assert_eq!(parse_timestamp("1970-01-01 00:00:02.5 UTC"), Some(2_500));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = ObjectStore::memory().unwrap();
        store.put("/docs/report.pdf", b"%PDF-1.4".to_vec()).await.unwrap();
        store.put("/docs/sub/notes.txt", b"notes".to_vec()).await.unwrap();

        assert!(store.exists("/").await.unwrap());
        assert!(store.exists("/docs/report.pdf").await.unwrap());
        assert!(!store.exists("/docs/missing.pdf").await.unwrap());
        assert!(!store.is_container("/docs/report.pdf").await.unwrap());
        assert_eq!(store.length("/docs/report.pdf").await.unwrap(), 8);
        assert!(store.get_acl("/docs/report.pdf").await.unwrap().is_none());

        let mut content = String::new();
        store
            .open_content("/docs/sub/notes.txt")
            .await
            .unwrap()
            .read_to_string(&mut content)
            .await
            .unwrap();
        assert_eq!(content, "notes");

        let err = store.length("/docs/missing.pdf").await.unwrap_err();
        assert!(err.to_string().contains("cannot find"));
    }
}
