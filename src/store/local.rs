use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::store::backend::{join_id, ChildStream, ContentStream, StoreAdapter};
use crate::store::types::AccessEntry;

/// Local directory tree exposed as a store.
///
/// Identifiers are paths relative to `root`, starting with `/`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    include_hidden: bool,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include_hidden: false,
        }
    }

    /// Also report entries whose name starts with `.`.
    pub fn with_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an identifier onto the filesystem, refusing to leave the root.
    pub fn resolve(&self, id: &str) -> Result<PathBuf> {
        let relative = Path::new(id.trim_start_matches('/'));
        let mut path = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        format!("identifier '{}' escapes the store root", id),
                    )
                    .into())
                }
            }
        }
        Ok(path)
    }

    async fn metadata(&self, id: &str) -> Result<std::fs::Metadata> {
        let path = self.resolve(id)?;
        tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))
    }
}

#[async_trait]
impl StoreAdapter for LocalStore {
    async fn exists(&self, id: &str) -> Result<bool> {
        let path = self.resolve(id)?;
        tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to check existence of {}", path.display()))
    }

    async fn is_container(&self, id: &str) -> Result<bool> {
        Ok(self.metadata(id).await?.is_dir())
    }

    async fn last_modified(&self, id: &str) -> Result<i64> {
        let modified = self
            .metadata(id)
            .await?
            .modified()
            .with_context(|| format!("Modification time unavailable for {}", id))?;
        let millis = match modified.duration_since(std::time::UNIX_EPOCH) {
            Ok(since) => since.as_millis() as i64,
            Err(before) => -(before.duration().as_millis() as i64),
        };
        Ok(millis)
    }

    async fn length(&self, id: &str) -> Result<u64> {
        let metadata = self.metadata(id).await?;
        Ok(if metadata.is_dir() { 0 } else { metadata.len() })
    }

    async fn list_children(&self, id: &str) -> Result<ChildStream> {
        let path = self.resolve(id)?;
        let mut read_dir = tokio::fs::read_dir(&path)
            .await
            .with_context(|| format!("Failed to read directory: {}", path.display()))?;

        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !self.include_hidden && name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();

        let parent = id.to_string();
        Ok(stream::iter(names)
            .map(move |name| Ok(join_id(&parent, &name)))
            .boxed())
    }

    async fn open_content(&self, id: &str) -> Result<ContentStream> {
        let path = self.resolve(id)?;
        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Box::new(file))
    }

    async fn get_acl(&self, id: &str) -> Result<Option<Vec<AccessEntry>>> {
        let metadata = self.metadata(id).await?;
        Ok(mode_acl(&metadata))
    }

    async fn get_container_acl(&self, _id: &str) -> Result<Option<Vec<AccessEntry>>> {
        let metadata = tokio::fs::metadata(&self.root)
            .await
            .with_context(|| format!("Failed to stat store root {}", self.root.display()))?;
        Ok(mode_acl(&metadata))
    }
}

/// Derive ACEs from Unix ownership and permission bits.
#[cfg(unix)]
fn mode_acl(metadata: &std::fs::Metadata) -> Option<Vec<AccessEntry>> {
    use crate::store::types::READ_DATA;
    use std::os::unix::fs::MetadataExt;

    let mode = metadata.mode();
    let mask = |bit: u32| if mode & bit != 0 { READ_DATA } else { 0 };
    Some(vec![
        AccessEntry::allow(&format!("uid:{}", metadata.uid()), mask(0o400)),
        AccessEntry::allow(&format!("gid:{}", metadata.gid()), mask(0o040)),
        AccessEntry::allow("everyone", mask(0o004)),
    ])
}

#[cfg(not(unix))]
fn mode_acl(_metadata: &std::fs::Metadata) -> Option<Vec<AccessEntry>> {
    None
}
