//! Ordered (pattern, replacement) remap tables.
//!
//! The first entry whose pattern matches rewrites the value; the remaining
//! entries are not consulted. Replacements may reference capture groups
//! (`$1`, `${name}`).

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Serialized form of one remap entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapSpec {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone)]
struct RemapEntry {
    pattern: Regex,
    replacement: String,
}

#[derive(Debug, Clone, Default)]
pub struct RemapTable {
    entries: Vec<RemapEntry>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a table from its serialized entries, preserving order.
    pub fn from_specs(specs: &[RemapSpec]) -> Result<Self> {
        let mut table = Self::new();
        for spec in specs {
            table.push(&spec.pattern, &spec.replacement)?;
        }
        Ok(table)
    }

    pub fn push(&mut self, pattern: &str, replacement: &str) -> Result<()> {
        let compiled = Regex::new(pattern)
            .with_context(|| format!("Invalid remap pattern '{}'", pattern))?;
        self.entries.push(RemapEntry {
            pattern: compiled,
            replacement: replacement.to_string(),
        });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite `value` with the first matching entry, or return it unchanged.
    pub fn apply(&self, value: &str) -> String {
        self.entries
            .iter()
            .find(|entry| entry.pattern.is_match(value))
            .map(|entry| {
                entry
                    .pattern
                    .replace(value, entry.replacement.as_str())
                    .into_owned()
            })
            .unwrap_or_else(|| value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_is_identity() {
        let table = RemapTable::new();
        assert!(table.is_empty());
        assert_eq!(table.apply("/docs/a.pdf"), "/docs/a.pdf");
    }

    #[test]
    fn test_first_match_wins() {
        let table = RemapTable::from_specs(&[
            RemapSpec {
                pattern: "^/docs/(.*)$".to_string(),
                replacement: "documents/$1".to_string(),
            },
            RemapSpec {
                pattern: "^/(.*)$".to_string(),
                replacement: "root/$1".to_string(),
            },
        ])
        .unwrap();

        assert_eq!(table.apply("/docs/a.pdf"), "documents/a.pdf");
        assert_eq!(table.apply("/misc/a.pdf"), "root/misc/a.pdf");
        assert_eq!(table.apply("relative"), "relative");
    }

    #[test]
    fn test_invalid_pattern() {
        let mut table = RemapTable::new();
        assert!(table.push("(unclosed", "x").is_err());
    }
}
