use serde::{Deserialize, Serialize};

/// Read-capable rights bits in an access mask.
pub const READ_DATA: u32 = 0x0000_0001;
pub const GENERIC_ALL: u32 = 0x1000_0000;
pub const GENERIC_READ: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    #[serde(rename = "directory", alias = "container")]
    Container,
    #[serde(rename = "file", alias = "leaf")]
    Leaf,
}

impl EntryKind {
    pub fn is_container(self) -> bool {
        matches!(self, EntryKind::Container)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Container => "directory",
            EntryKind::Leaf => "file",
        }
    }
}

/// One raw access-control entry as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    pub principal: String,
    pub allow: bool,
    pub mask: u32,
}

impl AccessEntry {
    pub fn allow(principal: &str, mask: u32) -> Self {
        Self {
            principal: principal.to_string(),
            allow: true,
            mask,
        }
    }

    pub fn deny(principal: &str, mask: u32) -> Self {
        Self {
            principal: principal.to_string(),
            allow: false,
            mask,
        }
    }

    pub fn grants_read(&self) -> bool {
        self.mask & (READ_DATA | GENERIC_READ | GENERIC_ALL) != 0
    }
}

/// A node in the remote store, as seen by the decision engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Canonical store identifier (`/`-separated path).
    pub id: String,
    pub kind: EntryKind,
    /// Leaf length in bytes; always 0 for containers.
    pub length: u64,
    /// Last-modified time in milliseconds since the epoch.
    pub modified: i64,
    /// Entry-level ACEs; `None` when the store could not report them.
    pub acl: Option<Vec<AccessEntry>>,
    /// Container-level (share) ACEs; `None` when unavailable.
    pub container_acl: Option<Vec<AccessEntry>>,
}

impl Entry {
    pub fn leaf(id: &str, length: u64, modified: i64) -> Self {
        Self {
            id: id.to_string(),
            kind: EntryKind::Leaf,
            length,
            modified,
            acl: None,
            container_acl: None,
        }
    }

    pub fn container(id: &str, modified: i64) -> Self {
        Self {
            id: id.to_string(),
            kind: EntryKind::Container,
            length: 0,
            modified,
            acl: None,
            container_acl: None,
        }
    }

    pub fn with_acl(mut self, acl: Vec<AccessEntry>) -> Self {
        self.acl = Some(acl);
        self
    }

    pub fn with_container_acl(mut self, acl: Vec<AccessEntry>) -> Self {
        self.container_acl = Some(acl);
        self
    }

    /// Final path component.
    pub fn name(&self) -> &str {
        let trimmed = self.id.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }

    pub fn is_container(&self) -> bool {
        self.kind.is_container()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_name() {
        assert_eq!(Entry::leaf("/docs/report.pdf", 1, 0).name(), "report.pdf");
        assert_eq!(Entry::container("/docs/sub/", 0).name(), "sub");
        assert_eq!(Entry::leaf("plain", 1, 0).name(), "plain");
    }

    #[test]
    fn test_grants_read() {
        assert!(AccessEntry::allow("S-1-1-0", READ_DATA).grants_read());
        assert!(AccessEntry::allow("S-1-1-0", GENERIC_ALL).grants_read());
        assert!(!AccessEntry::allow("S-1-1-0", 0x2).grants_read());
    }
}
