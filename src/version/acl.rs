//! Access-control lists carried in version tokens.

use serde::{Deserialize, Serialize};

use crate::store::AccessEntry;

/// Deny principal injected into every computed ACL so that an unreadable or
/// incomplete ACL never widens access.
pub const FAIL_CLOSED_PRINCIPAL: &str = "DEAD_AUTHORITY";

/// How an ACL group is produced for a job.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AclPolicy {
    /// Security is off; the group is absent from the token.
    #[default]
    Disabled,
    /// Derive the ACL from the store's access-control entries.
    Native,
    /// Use these tokens regardless of what the store reports.
    Forced(Vec<String>),
}

impl From<Option<Vec<String>>> for AclPolicy {
    /// `None` disables security, an empty list selects native ACLs.
    fn from(forced: Option<Vec<String>>) -> Self {
        match forced {
            None => AclPolicy::Disabled,
            Some(tokens) if tokens.is_empty() => AclPolicy::Native,
            Some(tokens) => AclPolicy::Forced(tokens),
        }
    }
}

/// Allow/deny principal lists, each sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclPair {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl AclPolicy {
    /// Resolve the ACL group for an entry, or `None` when security is off.
    pub fn resolve(&self, native: Option<&[AccessEntry]>) -> Option<AclPair> {
        match self {
            AclPolicy::Disabled => None,
            AclPolicy::Forced(tokens) => {
                let mut allow = tokens.clone();
                allow.sort();
                allow.dedup();
                Some(AclPair {
                    allow,
                    deny: vec![FAIL_CLOSED_PRINCIPAL.to_string()],
                })
            }
            AclPolicy::Native => Some(native_acl(native.unwrap_or_default())),
        }
    }
}

/// Partition read-capable entries into allow and deny lists.
pub fn native_acl(entries: &[AccessEntry]) -> AclPair {
    let mut pair = AclPair::default();
    for entry in entries.iter().filter(|entry| entry.grants_read()) {
        if entry.allow {
            pair.allow.push(entry.principal.clone());
        } else {
            pair.deny.push(entry.principal.clone());
        }
    }
    pair.deny.push(FAIL_CLOSED_PRINCIPAL.to_string());

    pair.allow.sort();
    pair.allow.dedup();
    pair.deny.sort();
    pair.deny.dedup();
    pair
}
