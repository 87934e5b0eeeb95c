//! Flat-chunk SQL fragment builder (spec assembly primitive, component C8).
//!
//! Adapted from `drizzle-core::sql::{SQL, SQLChunk}`: a `SmallVec` of
//! [`Token`]s that get joined with a whitespace heuristic rather than
//! concatenated naively, so callers can freely compose fragments (`WHERE`
//! clauses, join lists, order-by lists) without tracking trailing/leading
//! spaces themselves. The teacher's version is generic over a parameter
//! value type baked in at the chunk level; here placeholders are deferred
//! markers (`Token::Placeholder`) resolved against a [`crate::dialect::Dialect`]
//! only at final render time, since a fragment built while compiling a
//! nested `include` may be spliced into a statement whose placeholder
//! numbering isn't known until assembly.

use smallvec::SmallVec;

use crate::dialect::Dialect;

/// One piece of a SQL fragment under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Raw SQL text, already known to be safe to embed verbatim (an
    /// identifier that passed through [`crate::ident`], a keyword, an
    /// operator). Never user data.
    Raw(String),
    /// A forced whitespace boundary between two tokens that would
    /// otherwise be mashed together (mirrors the teacher's spacing rule
    /// for chunk joins).
    Space,
    /// A bound parameter, referenced by its position in the enclosing
    /// statement's parameter list (0-based). Rendered as `$N`/`?` at
    /// `render` time depending on dialect.
    Placeholder(usize),
}

/// A composable SQL fragment: an identifier, an expression, a clause, or
/// an entire statement. Cheap to build incrementally; call [`Sql::render`]
/// once, at the top of assembly, to produce the final query text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sql {
    tokens: SmallVec<[Token; 8]>,
}

impl Sql {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a literal string known to be safe SQL text.
    pub fn raw(text: impl Into<String>) -> Self {
        let mut sql = Self::new();
        sql.tokens.push(Token::Raw(text.into()));
        sql
    }

    /// A single bound-parameter placeholder referencing `param_index`.
    pub fn placeholder(param_index: usize) -> Self {
        let mut sql = Self::new();
        sql.tokens.push(Token::Placeholder(param_index));
        sql
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Appends another fragment, inserting a space boundary between them.
    pub fn append(mut self, mut other: Sql) -> Self {
        if !self.tokens.is_empty() && !other.tokens.is_empty() {
            self.tokens.push(Token::Space);
        }
        self.tokens.append(&mut other.tokens);
        self
    }

    /// Appends raw text with no implied space boundary (for punctuation
    /// like `,` or `(` that must hug the preceding token).
    pub fn append_raw(mut self, text: impl Into<String>) -> Self {
        self.tokens.push(Token::Raw(text.into()));
        self
    }

    /// Appends another fragment with no implied space boundary.
    pub fn append_tight(mut self, mut other: Sql) -> Self {
        self.tokens.append(&mut other.tokens);
        self
    }

    pub fn push(&mut self, other: Sql) {
        if !self.tokens.is_empty() && !other.tokens.is_empty() {
            self.tokens.push(Token::Space);
        }
        self.tokens.extend(other.tokens);
    }

    pub fn push_raw(&mut self, text: impl Into<String>) {
        self.tokens.push(Token::Raw(text.into()));
    }

    /// Joins `parts` with `sep` as raw text between them (no implied space;
    /// callers pass `", "` or similar). Returns an empty `Sql` for an empty
    /// slice, matching the teacher's `Join` builder's zero-element case.
    pub fn join(parts: impl IntoIterator<Item = Sql>, sep: &str) -> Sql {
        let mut out = Sql::new();
        let mut first = true;
        for part in parts {
            if part.is_empty() {
                continue;
            }
            if !first {
                out = out.append_raw(sep);
            }
            out = out.append_tight(part);
            first = false;
        }
        out
    }

    pub fn parenthesized(self) -> Sql {
        Sql::raw("(").append_tight(self).append_tight(Sql::raw(")"))
    }

    /// Resolves every [`Token::Placeholder`] against `dialect` and flattens
    /// the fragment into the final SQL text.
    pub fn render(&self, dialect: Dialect) -> String {
        let mut out = String::new();
        let mut prev_was_space = true; // suppress leading space
        for token in &self.tokens {
            match token {
                Token::Raw(text) => {
                    out.push_str(text);
                    prev_was_space = text.ends_with(' ');
                }
                Token::Space => {
                    if !prev_was_space {
                        out.push(' ');
                        prev_was_space = true;
                    }
                }
                Token::Placeholder(index) => {
                    out.push_str(&dialect.render_placeholder(index + 1));
                    prev_was_space = false;
                }
            }
        }
        out
    }

    /// Returns the ordered list of parameter indices this fragment
    /// references, in the order they appear in the rendered text. Used by
    /// assembly (C8) to validate that every stored parameter is reachable
    /// and that placeholders appear in a stable order (spec testable
    /// property "placeholder density").
    pub fn referenced_params(&self) -> Vec<usize> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Placeholder(i) => Some(*i),
                _ => None,
            })
            .collect()
    }
}

impl From<&str> for Sql {
    fn from(value: &str) -> Self {
        Sql::raw(value)
    }
}

impl From<String> for Sql {
    fn from(value: String) -> Self {
        Sql::raw(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_inserts_single_space_boundary() {
        let sql = Sql::raw("SELECT").append(Sql::raw("*")).append(Sql::raw("FROM")).append(Sql::raw("users"));
        assert_eq!(sql.render(Dialect::PostgreSQL), "SELECT * FROM users");
    }

    #[test]
    fn append_tight_has_no_boundary() {
        let sql = Sql::raw("users").append_tight(Sql::raw(".")).append_tight(Sql::raw("id"));
        assert_eq!(sql.render(Dialect::PostgreSQL), "users.id");
    }

    #[test]
    fn placeholder_renders_per_dialect() {
        let sql = Sql::raw("col =").append(Sql::placeholder(0));
        assert_eq!(sql.render(Dialect::PostgreSQL), "col = $1");
        assert_eq!(sql.render(Dialect::SQLite), "col = ?");
    }

    #[test]
    fn join_skips_empty_fragments() {
        let sql = Sql::join(vec![Sql::raw("a"), Sql::new(), Sql::raw("b")], ", ");
        assert_eq!(sql.render(Dialect::PostgreSQL), "a, b");
    }

    #[test]
    fn join_empty_slice_is_empty() {
        let sql: Sql = Sql::join(Vec::<Sql>::new(), ", ");
        assert!(sql.is_empty());
    }

    #[test]
    fn referenced_params_in_order() {
        let sql = Sql::raw("a =").append(Sql::placeholder(2)).append_raw(" AND b =").append(Sql::placeholder(5));
        assert_eq!(sql.referenced_params(), vec![2, 5]);
    }
}
