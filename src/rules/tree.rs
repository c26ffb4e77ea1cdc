//! Rule tree model.
//!
//! A rule tree is an ordered list of scopes. Each scope is anchored at a
//! path prefix and owns an ordered list of include/exclude rules; the first
//! rule that resolves to a match decides.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::store::EntryKind;

/// Whether a matching rule admits or rejects the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Include,
    Exclude,
}

/// Tri-state constraint on the entry's indexability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Indexable {
    /// No constraint.
    #[default]
    Any,
    /// Rule only applies to indexable content.
    Yes,
    /// Rule only applies to non-indexable content.
    No,
}

impl Indexable {
    /// Check whether a resolved indexability satisfies the constraint.
    pub fn accepts(self, indexable: bool) -> bool {
        match self {
            Indexable::Any => true,
            Indexable::Yes => indexable,
            Indexable::No => !indexable,
        }
    }
}

/// A single include/exclude rule inside a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub action: RuleAction,
    /// Glob matched against the entry name (or the scope-relative path if it contains `/`).
    pub filespec: String,
    #[serde(default)]
    pub kind: Option<EntryKind>,
    #[serde(default)]
    pub indexable: Indexable,
}

impl Rule {
    pub fn include(filespec: &str) -> Self {
        Self {
            action: RuleAction::Include,
            filespec: filespec.to_string(),
            kind: None,
            indexable: Indexable::Any,
        }
    }

    pub fn exclude(filespec: &str) -> Self {
        Self {
            action: RuleAction::Exclude,
            ..Self::include(filespec)
        }
    }

    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_indexable(mut self, indexable: Indexable) -> Self {
        self.indexable = indexable;
        self
    }
}

/// Rules anchored at a path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub path: String,
    #[serde(default, rename = "rule")]
    pub rules: Vec<Rule>,
}

impl Scope {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            rules: Vec::new(),
        }
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Anchor path without a trailing separator ("/" stays "/").
    pub fn anchor(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/"
        } else {
            trimmed
        }
    }

    /// Check whether `id` is the anchor itself.
    pub fn is_anchor(&self, id: &str) -> bool {
        let id = id.trim_end_matches('/');
        let id = if id.is_empty() { "/" } else { id };
        id.eq_ignore_ascii_case(self.anchor())
    }

    /// Path of `id` below the anchor, with a leading `/`, if `id` is a descendant.
    pub fn relative<'a>(&self, id: &'a str) -> Option<&'a str> {
        let anchor = self.anchor();
        if anchor == "/" {
            return id.starts_with('/').then_some(id).filter(|rest| rest.len() > 1);
        }
        if id.len() <= anchor.len() || !id.is_char_boundary(anchor.len()) {
            return None;
        }
        let (head, rest) = id.split_at(anchor.len());
        (head.eq_ignore_ascii_case(anchor) && rest.starts_with('/') && rest.len() > 1)
            .then_some(rest)
    }
}

/// Ordered forest of scopes plus job-wide metadata limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTree {
    /// Leaves longer than this are never included.
    #[serde(default)]
    pub max_length: Option<u64>,
    #[serde(default, rename = "scope")]
    pub scopes: Vec<Scope>,
}

impl RuleTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scopes.push(scope);
        self
    }

    pub fn with_max_length(mut self, max_length: u64) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Reject trees that cannot be evaluated meaningfully.
    pub fn validate(&self) -> Result<()> {
        for (index, scope) in self.scopes.iter().enumerate() {
            if !scope.path.starts_with('/') {
                bail!(
                    "scope #{} has path '{}'; scope paths must start with '/'",
                    index + 1,
                    scope.path
                );
            }
            for rule in &scope.rules {
                if rule.filespec.is_empty() {
                    bail!("scope '{}' contains a rule with an empty filespec", scope.path);
                }
            }
        }
        Ok(())
    }
}
