//! Monotonic alias allocation (spec §3 `AliasGenerator`).
//!
//! Table and column aliases need to be short, collision-free, and stable
//! under the 63-byte identifier cap both dialects share. The truncate-and-
//! suffix scheme below is adapted from `chiselstrike`'s
//! `truncate_identifier`/`max_prefix` helpers in
//! `datastore/src/query.rs`, which solve the same PostgreSQL
//! `NAMEDATALEN` problem for generated join aliases.

use std::collections::HashSet;

use crate::error::CompileError;
use crate::ident::assert_safe_alias;
use crate::limits::{MAX_ALIASES, MAX_IDENTIFIER_LEN};

/// Hands out unique, length-bounded aliases for generated tables and
/// columns within a single compile. Not reused across compiles.
pub struct AliasGenerator {
    seen: HashSet<String>,
    counter: usize,
}

impl Default for AliasGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasGenerator {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
            counter: 0,
        }
    }

    /// Allocates a new alias built from `hint` (usually a model or field
    /// name), truncated to fit under [`MAX_IDENTIFIER_LEN`] once a
    /// disambiguating suffix is appended, and guaranteed unique within
    /// this generator's lifetime.
    pub fn next(&mut self, hint: &str) -> Result<String, CompileError> {
        if self.seen.len() >= MAX_ALIASES {
            return Err(CompileError::Critical(format!(
                "alias budget of {MAX_ALIASES} exhausted"
            )));
        }
        let suffix = format!("_{}", self.counter);
        self.counter += 1;
        let max_prefix_len = MAX_IDENTIFIER_LEN.saturating_sub(suffix.len());
        let prefix = truncate_identifier(hint, max_prefix_len);
        let alias = format!("{prefix}{suffix}");
        assert_safe_alias(&alias)?;
        self.seen.insert(alias.clone());
        Ok(alias)
    }

    /// Allocates an alias with no particular hint (used for anonymous
    /// subquery/lateral aliases).
    pub fn anonymous(&mut self) -> Result<String, CompileError> {
        self.next("t")
    }
}

/// Truncates `name` to at most `max_len` bytes on a UTF-8 boundary.
fn truncate_identifier(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }
    let mut end = max_len;
    while end > 0 && !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_unique_aliases() {
        let mut gen = AliasGenerator::new();
        let a = gen.next("posts").unwrap();
        let b = gen.next("posts").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn truncates_long_hints_under_limit() {
        let mut gen = AliasGenerator::new();
        let hint = "a".repeat(200);
        let alias = gen.next(&hint).unwrap();
        assert!(alias.len() <= MAX_IDENTIFIER_LEN);
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let mut gen = AliasGenerator::new();
        let hint = "é".repeat(100);
        let alias = gen.next(&hint).unwrap();
        assert!(alias.len() <= MAX_IDENTIFIER_LEN);
        assert!(String::from_utf8(alias.into_bytes()).is_ok());
    }

    #[test]
    fn anonymous_aliases_are_unique_too() {
        let mut gen = AliasGenerator::new();
        let a = gen.anonymous().unwrap();
        let b = gen.anonymous().unwrap();
        assert_ne!(a, b);
    }
}
