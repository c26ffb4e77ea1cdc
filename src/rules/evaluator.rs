//! Inclusion decisions over a rule tree.
//!
//! All three checks share one traversal and differ only in how they resolve
//! a rule's indexability constraint when the answer would need content:
//!
//! - [`RuleTree::check_include`] is permissive: an unresolved include rule
//!   admits the entry, an unresolved exclude rule is passed over.
//! - [`RuleTree::would_be_included`] pretends the content is (or is not)
//!   indexable. Running it both ways shows whether the outcome hinges on content.
//! - [`RuleTree::check_ingest`] uses the fingerprint of the fetched content.

use crate::crawl::Fingerprint;
use crate::rules::tree::{Rule, RuleAction, RuleTree, Scope};
use crate::rules::wildcard;
use crate::store::Entry;

#[derive(Debug, Clone, Copy)]
enum Resolve<'a> {
    Permissive,
    Pretend(bool),
    Inspect(&'a Fingerprint),
}

/// Result of evaluating one rule against an entry.
enum RuleMatch {
    Matched,
    Missed,
    Ambiguous,
}

impl RuleTree {
    /// Decide inclusion from cheap metadata only.
    pub fn check_include(&self, entry: &Entry) -> bool {
        self.evaluate(entry, Resolve::Permissive)
    }

    /// Decide inclusion assuming the content's indexability is `pretend_indexable`.
    pub fn would_be_included(&self, entry: &Entry, pretend_indexable: bool) -> bool {
        self.evaluate(entry, Resolve::Pretend(pretend_indexable))
    }

    /// Decide inclusion using the fingerprint of the fetched content.
    pub fn check_ingest(&self, entry: &Entry, fingerprint: &Fingerprint) -> bool {
        self.evaluate(entry, Resolve::Inspect(fingerprint))
    }

    /// True when the inclusion outcome depends on the entry's content.
    pub fn depends_on_content(&self, entry: &Entry) -> bool {
        self.would_be_included(entry, true) != self.would_be_included(entry, false)
    }

    fn evaluate(&self, entry: &Entry, resolve: Resolve<'_>) -> bool {
        if !entry.is_container() {
            if let Some(limit) = self.max_length {
                if entry.length > limit {
                    return false;
                }
            }
        }

        for scope in &self.scopes {
            if scope.is_anchor(&entry.id) {
                return true;
            }
            let Some(relative) = scope.relative(&entry.id) else {
                continue;
            };

            for rule in &scope.rules {
                match rule_match(rule, entry, relative, resolve) {
                    RuleMatch::Matched => return rule.action == RuleAction::Include,
                    RuleMatch::Missed => {}
                    RuleMatch::Ambiguous => {
                        if rule.action == RuleAction::Include {
                            return true;
                        }
                    }
                }
            }
        }

        false
    }
}

// Cheapest test first: glob, then kind, then indexability.
fn rule_match(rule: &Rule, entry: &Entry, relative: &str, resolve: Resolve<'_>) -> RuleMatch {
    let subject = if rule.filespec.contains('/') {
        relative
    } else {
        entry.name()
    };
    if !wildcard::matches(subject, &rule.filespec) {
        return RuleMatch::Missed;
    }

    if let Some(kind) = rule.kind {
        if kind != entry.kind {
            return RuleMatch::Missed;
        }
    }

    if rule.indexable.accepts(true) && rule.indexable.accepts(false) {
        return RuleMatch::Matched;
    }

    // Directories are never indexable
    let indexable = if entry.is_container() {
        false
    } else {
        match resolve {
            Resolve::Permissive => return RuleMatch::Ambiguous,
            Resolve::Pretend(value) => value,
            Resolve::Inspect(fingerprint) => fingerprint.indexable,
        }
    };

    if rule.indexable.accepts(indexable) {
        RuleMatch::Matched
    } else {
        RuleMatch::Missed
    }
}

/// Scopes in `tree` whose anchor contains `id`, in evaluation order.
pub fn covering_scopes<'a>(tree: &'a RuleTree, id: &'a str) -> impl Iterator<Item = &'a Scope> + 'a {
    tree.scopes
        .iter()
        .filter(move |scope| scope.is_anchor(id) || scope.relative(id).is_some())
}
