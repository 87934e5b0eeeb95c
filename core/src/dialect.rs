//! Dialect enum and the `DialectAdapter` seam (spec §4.3, component C3).
//!
//! Mirrors `drizzle-core::dialect`: a small marker enum plus an extension
//! trait for placeholder rendering. Unlike the teacher, the rest of the
//! dialect-conditional fragments (array containment, JSON extraction,
//! aggregate-to-array, `DISTINCT ON` emulation, null ordering) are pulled
//! out into their own trait, `DialectAdapter`, implemented once per
//! dialect crate (`nestquery-postgres`, `nestquery-sqlite`) instead of
//! being inlined as `match` arms in core — the schema is a runtime value
//! here, not a type parameter, so there is no compile-time specialization
//! to lean on.

use std::borrow::Cow;

use crate::sql::Sql;

/// Which of the two supported SQL dialects a compile targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    PostgreSQL,
    SQLite,
}

impl Dialect {
    /// Renders a placeholder for this dialect at the given 1-based index.
    ///
    /// PostgreSQL: `$1`, `$2`, ... SQLite: `?` (SQLite placeholders carry no
    /// index; the driver binds them positionally in appearance order).
    pub fn render_placeholder(&self, index: usize) -> Cow<'static, str> {
        match self {
            Dialect::PostgreSQL => Cow::Owned(format!("${index}")),
            Dialect::SQLite => Cow::Borrowed("?"),
        }
    }

    /// Default NULL ordering for a direction when the caller didn't specify
    /// one explicitly (spec §4.3 "Default nulls-first rule").
    pub fn default_nulls_first(&self, ascending: bool) -> bool {
        match self {
            Dialect::PostgreSQL => !ascending, // asc -> last, desc -> first
            Dialect::SQLite => ascending,      // asc -> first, desc -> last
        }
    }
}

/// Per-dialect fragment generation (spec §4.3 table). Implemented by
/// `nestquery-postgres::PostgresDialect` and `nestquery-sqlite::SqliteDialect`.
///
/// Every method returns a ready-to-embed `Sql` fragment; callers are
/// responsible for placing it into the surrounding statement. Implementors
/// must not emit user-controlled values directly into the returned SQL —
/// they are pushed through the caller-supplied parameter placeholders.
pub trait DialectAdapter: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// `col @> ARRAY[v]::T[]` (Postgres) / `EXISTS(SELECT 1 FROM json_each(col) WHERE value = v)` (SQLite)
    fn array_contains_one(&self, column: Sql, value_placeholder: Sql, sql_type: &str) -> Sql;

    /// `col @> ARRAY[v1,..]::T[]` (Postgres "contains all") /
    /// nested `NOT EXISTS` over `json_each` (SQLite)
    fn array_contains_all(&self, column: Sql, value_placeholders: Vec<Sql>, sql_type: &str) -> Sql;

    /// `col && ARRAY[v1,..]::T[]` (Postgres "contains some") /
    /// `EXISTS` over `json_each ... IN (...)` (SQLite)
    fn array_contains_some(
        &self,
        column: Sql,
        value_placeholders: Vec<Sql>,
        sql_type: &str,
    ) -> Sql;

    /// `col = '[]'`/`json_array_length` style emptiness check for list scalars.
    fn array_is_empty(&self, column: Sql, sql_type: &str) -> Sql;

    /// Tests `column` against a single bound *set* parameter (used by the
    /// planner's batched-relation queries, where the parent key list
    /// isn't known until the primary query has run). `col = ANY($1)`
    /// (Postgres) / `col IN (SELECT value FROM json_each(?))` (SQLite).
    fn bind_in_set(&self, column: Sql, set_placeholder: Sql) -> Sql;

    /// Case-insensitive LIKE: `col ILIKE pat` (Postgres) / `LOWER(col) LIKE LOWER(pat)` (SQLite)
    fn case_insensitive_like(&self, column: Sql, pattern_placeholder: Sql) -> Sql;

    /// Case-sensitive LIKE: `col LIKE pat`
    fn like(&self, column: Sql, pattern_placeholder: Sql) -> Sql {
        column.append_raw(" LIKE ").append(pattern_placeholder)
    }

    /// `col#>>path` (Postgres) / `json_extract(col, path)` (SQLite)
    fn json_extract_text(&self, column: Sql, json_path: &str) -> Sql;

    /// Aggregates `expr` into a JSON array, optionally ordered.
    /// `json_agg(x ORDER BY ...)` (Postgres) / `json_group_array(x)` (SQLite)
    fn json_agg(&self, expr: Sql, order_by: Option<Sql>) -> Sql;

    /// Builds a JSON object from alternating key/value SQL pairs.
    /// `json_build_object(...)` (Postgres) / `json_object(...)` (SQLite)
    fn json_build_object(&self, pairs: Vec<(String, Sql)>) -> Sql;

    /// Whether this dialect supports `DISTINCT ON (...)` natively.
    fn supports_distinct_on(&self) -> bool;

    /// `COALESCE(expr, '[]')`-style default used to make absent child rows
    /// render as an empty array/object rather than NULL.
    fn coalesce_empty_array(&self, expr: Sql) -> Sql {
        Sql::raw("COALESCE(")
            .append(expr)
            .append_raw(", '[]')")
    }

    fn coalesce_empty_object(&self, expr: Sql) -> Sql {
        Sql::raw("COALESCE(")
            .append(expr)
            .append_raw(", '{}')")
    }
}
