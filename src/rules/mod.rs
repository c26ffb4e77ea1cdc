//! Inclusion rules: wildcard matching, the scoped rule tree, and remap tables.

pub mod evaluator;
pub mod remap;
pub mod tree;
pub mod wildcard;

pub use evaluator::covering_scopes;
pub use remap::{RemapSpec, RemapTable};
pub use tree::{Indexable, Rule, RuleAction, RuleTree, Scope};
