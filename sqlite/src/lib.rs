//! SQLite dialect adapter.
//!
//! SQLite has no array type, no `ILIKE`, and no `DISTINCT ON`; every one
//! of those gets emulated through `json_each`/`json_extract` or (for
//! `DISTINCT ON`) a `ROW_NUMBER()` wrapper assembly already applies. This
//! adapter supplies the fragment-level half of that emulation — list
//! columns here are stored as JSON text, matching the schema convention
//! SQLite users of this compiler are expected to use for list scalars.

use nestquery_core::dialect::{Dialect, DialectAdapter};
use nestquery_core::sql::Sql;

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl DialectAdapter for SqliteDialect {
    fn dialect(&self) -> Dialect {
        Dialect::SQLite
    }

    fn array_contains_one(&self, column: Sql, value_placeholder: Sql, _sql_type: &str) -> Sql {
        Sql::raw("EXISTS(SELECT 1 FROM json_each(")
            .append_tight(column)
            .append_tight(Sql::raw(") WHERE value ="))
            .append(value_placeholder)
            .append_tight(Sql::raw(")"))
    }

    fn array_contains_all(&self, column: Sql, value_placeholders: Vec<Sql>, _sql_type: &str) -> Sql {
        // All of value_placeholders must be present: no placeholder
        // exists for which json_each(column) has no matching row.
        let checks = value_placeholders
            .into_iter()
            .map(|ph| {
                Sql::raw("EXISTS(SELECT 1 FROM json_each(")
                    .append_tight(column.clone())
                    .append_tight(Sql::raw(") WHERE value ="))
                    .append(ph)
                    .append_tight(Sql::raw(")"))
            })
            .collect::<Vec<_>>();
        Sql::join(checks, " AND ")
    }

    fn array_contains_some(&self, column: Sql, value_placeholders: Vec<Sql>, _sql_type: &str) -> Sql {
        Sql::raw("EXISTS(SELECT 1 FROM json_each(")
            .append_tight(column)
            .append_tight(Sql::raw(") WHERE value IN"))
            .append(Sql::join(value_placeholders, ", ").parenthesized())
            .append_tight(Sql::raw(")"))
    }

    fn array_is_empty(&self, column: Sql, _sql_type: &str) -> Sql {
        Sql::raw("json_array_length(").append_tight(column).append_tight(Sql::raw(") = 0"))
    }

    fn case_insensitive_like(&self, column: Sql, pattern_placeholder: Sql) -> Sql {
        Sql::raw("LOWER(")
            .append_tight(column)
            .append_tight(Sql::raw(")"))
            .append_raw(" LIKE LOWER(")
            .append_tight(pattern_placeholder)
            .append_tight(Sql::raw(")"))
    }

    fn json_extract_text(&self, column: Sql, json_path: &str) -> Sql {
        Sql::raw("json_extract(").append_tight(column).append_tight(Sql::raw(format!(", '$.{json_path}')")))
    }

    fn json_agg(&self, expr: Sql, order_by: Option<Sql>) -> Sql {
        // SQLite's json_group_array has no ORDER BY clause of its own;
        // order is instead imposed by an ORDER BY on the underlying
        // LATERAL subquery (handled by the include builder), so any
        // order hint here is a no-op, consistent with that split.
        let _ = order_by;
        Sql::raw("json_group_array(").append_tight(expr).append_tight(Sql::raw(")"))
    }

    fn json_build_object(&self, pairs: Vec<(String, Sql)>) -> Sql {
        let mut parts = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            parts.push(Sql::raw(format!("'{key}',")).append(value));
        }
        Sql::raw("json_object(").append_tight(Sql::join(parts, ", ")).append_tight(Sql::raw(")"))
    }

    fn supports_distinct_on(&self) -> bool {
        false
    }

    fn bind_in_set(&self, column: Sql, set_placeholder: Sql) -> Sql {
        column
            .append_raw(" IN (SELECT value FROM json_each(")
            .append_tight(set_placeholder)
            .append_tight(Sql::raw("))"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_contains_one_uses_json_each() {
        let dialect = SqliteDialect;
        let sql = dialect.array_contains_one(Sql::raw("\"t\".\"tags\""), Sql::placeholder(0), "text");
        let rendered = sql.render(Dialect::SQLite);
        assert!(rendered.contains("json_each(\"t\".\"tags\")"));
        assert!(rendered.contains("value = ?"));
    }

    #[test]
    fn case_insensitive_like_wraps_lower() {
        let dialect = SqliteDialect;
        let sql = dialect.case_insensitive_like(Sql::raw("\"t\".\"email\""), Sql::placeholder(0));
        assert_eq!(sql.render(Dialect::SQLite), "LOWER(\"t\".\"email\") LIKE LOWER(?)");
    }

    #[test]
    fn bind_in_set_uses_json_each() {
        let dialect = SqliteDialect;
        let sql = dialect.bind_in_set(Sql::raw("\"b\".\"author_id\""), Sql::placeholder(0));
        assert_eq!(sql.render(Dialect::SQLite), "\"b\".\"author_id\" IN (SELECT value FROM json_each(?))");
    }
}
