//! Version token layout.
//!
//! Fields, in order:
//!
//! ```text
//! [container allow, container deny] [entry allow, entry deny] [attr name, attr value]
//! ingest-uri  mtime  length  flag
//! ```
//!
//! Bracketed groups start with `+` when present and `-` when absent. The
//! token is a pure function of the entry, the rule tree and the job's
//! security/path settings, so an unchanged entry always yields the same bytes.

use serde::{Deserialize, Serialize};

use crate::rules::RuleTree;
use crate::store::Entry;
use crate::version::acl::{AclPair, AclPolicy};
use crate::version::codec::{pack, pack_list, unpack, unpack_list};
use crate::version::uri::UriMapping;

/// Delimiter for every packed field.
pub const DELIMITER: char = '+';
const PRESENT: char = '+';
const ABSENT: char = '-';

/// Whether ingestion can be decided from metadata or needs the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityFlag {
    ForcedInclude,
    ForcedExclude,
    DependsOnFingerprint,
}

impl AmbiguityFlag {
    pub fn as_char(self) -> char {
        match self {
            AmbiguityFlag::ForcedInclude => 'I',
            AmbiguityFlag::ForcedExclude => 'X',
            AmbiguityFlag::DependsOnFingerprint => 'F',
        }
    }

    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            'I' => Some(AmbiguityFlag::ForcedInclude),
            'X' => Some(AmbiguityFlag::ForcedExclude),
            'F' => Some(AmbiguityFlag::DependsOnFingerprint),
            _ => None,
        }
    }

    /// Derive the flag from the two pretend evaluations.
    pub fn from_outcomes(if_indexable: bool, if_not_indexable: bool) -> Self {
        match (if_indexable, if_not_indexable) {
            (true, true) => AmbiguityFlag::ForcedInclude,
            (false, false) => AmbiguityFlag::ForcedExclude,
            _ => AmbiguityFlag::DependsOnFingerprint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathAttribute {
    pub name: String,
    pub value: String,
}

/// Logical contents of a version token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub container_acl: Option<AclPair>,
    pub entry_acl: Option<AclPair>,
    pub path_attribute: Option<PathAttribute>,
    pub ingest_uri: String,
    pub modified: i64,
    pub length: u64,
    pub ambiguity: AmbiguityFlag,
}

impl Version {
    pub fn encode(&self) -> String {
        let mut token = String::new();
        encode_acl(&mut token, self.container_acl.as_ref());
        encode_acl(&mut token, self.entry_acl.as_ref());
        match &self.path_attribute {
            Some(attribute) => {
                token.push(PRESENT);
                pack(&mut token, &attribute.name, DELIMITER);
                pack(&mut token, &attribute.value, DELIMITER);
            }
            None => token.push(ABSENT),
        }
        pack(&mut token, &self.ingest_uri, DELIMITER);
        pack(&mut token, &self.modified.to_string(), DELIMITER);
        pack(&mut token, &self.length.to_string(), DELIMITER);
        token.push(self.ambiguity.as_char());
        token
    }

    /// Decode a token. Missing trailing fields take their defaults; a
    /// missing flag reads as forced-include.
    pub fn decode(token: &str) -> Self {
        let mut position = 0;
        let container_acl = decode_acl(token, &mut position);
        let entry_acl = decode_acl(token, &mut position);

        let path_attribute = if take_sentinel(token, &mut position) {
            let (name, next) = unpack(token, position, DELIMITER);
            let (value, next) = unpack(token, next, DELIMITER);
            position = next;
            Some(PathAttribute { name, value })
        } else {
            None
        };

        let (ingest_uri, next) = unpack(token, position, DELIMITER);
        let (modified, next) = unpack(token, next, DELIMITER);
        let (length, next) = unpack(token, next, DELIMITER);
        let ambiguity = token
            .get(next..)
            .and_then(|rest| rest.chars().next())
            .and_then(AmbiguityFlag::from_char)
            .unwrap_or(AmbiguityFlag::ForcedInclude);

        Self {
            container_acl,
            entry_acl,
            path_attribute,
            ingest_uri,
            modified: modified.parse().unwrap_or_default(),
            length: length.parse().unwrap_or_default(),
            ambiguity,
        }
    }
}

fn encode_acl(token: &mut String, acl: Option<&AclPair>) {
    match acl {
        Some(pair) => {
            token.push(PRESENT);
            pack_list(token, &pair.allow, DELIMITER);
            pack_list(token, &pair.deny, DELIMITER);
        }
        None => token.push(ABSENT),
    }
}

fn decode_acl(token: &str, position: &mut usize) -> Option<AclPair> {
    if !take_sentinel(token, position) {
        return None;
    }
    let (allow, next) = unpack_list(token, *position, DELIMITER);
    let (deny, next) = unpack_list(token, next, DELIMITER);
    *position = next;
    Some(AclPair { allow, deny })
}

// Consumes a group sentinel; an unknown byte is left in place and read as absent.
fn take_sentinel(token: &str, position: &mut usize) -> bool {
    match token.get(*position..).and_then(|rest| rest.chars().next()) {
        Some(PRESENT) => {
            *position += 1;
            true
        }
        Some(ABSENT) => {
            *position += 1;
            false
        }
        _ => false,
    }
}

/// Computes version tokens for a job.
#[derive(Debug, Clone, Default)]
pub struct VersionEncoder {
    pub container_acl: AclPolicy,
    pub entry_acl: AclPolicy,
    pub mapping: UriMapping,
}

impl VersionEncoder {
    pub fn new(container_acl: AclPolicy, entry_acl: AclPolicy, mapping: UriMapping) -> Self {
        Self {
            container_acl,
            entry_acl,
            mapping,
        }
    }

    /// Logical version of `entry`; `uri_prefix` is the store's raw-path prefix.
    pub fn compute(&self, entry: &Entry, tree: &RuleTree, uri_prefix: &str) -> Version {
        let container_acl = self.container_acl.resolve(entry.container_acl.as_deref());
        let entry_acl = self.entry_acl.resolve(entry.acl.as_deref());
        let path_attribute = self
            .mapping
            .path_attribute(&entry.id, uri_prefix)
            .map(|(name, value)| PathAttribute { name, value });

        Version {
            container_acl,
            entry_acl,
            path_attribute,
            ingest_uri: self.mapping.ingest_uri(&entry.id, uri_prefix),
            modified: entry.modified,
            length: entry.length,
            ambiguity: AmbiguityFlag::from_outcomes(
                tree.would_be_included(entry, true),
                tree.would_be_included(entry, false),
            ),
        }
    }

    /// Encoded version token for `entry`.
    pub fn compute_version(&self, entry: &Entry, tree: &RuleTree, uri_prefix: &str) -> String {
        self.compute(entry, tree, uri_prefix).encode()
    }
}

/// Decode a version token.
pub fn decode_version(token: &str) -> Version {
    Version::decode(token)
}
