//! PostgreSQL dialect adapter.
//!
//! Implements [`nestquery_core::DialectAdapter`] using PostgreSQL's
//! native array operators (`@>`, `&&`), `ILIKE`, and `json_agg`/
//! `json_build_object`, matching the fragment shapes the teacher's
//! `drizzle-postgres` crate emits for its own condition builders.

use nestquery_core::dialect::{Dialect, DialectAdapter};
use nestquery_core::sql::Sql;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl DialectAdapter for PostgresDialect {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSQL
    }

    fn array_contains_one(&self, column: Sql, value_placeholder: Sql, sql_type: &str) -> Sql {
        column
            .append_raw(" @> ARRAY[")
            .append_tight(value_placeholder)
            .append_raw(format!("]::{sql_type}[]"))
    }

    fn array_contains_all(&self, column: Sql, value_placeholders: Vec<Sql>, sql_type: &str) -> Sql {
        column
            .append_raw(" @> ARRAY[")
            .append_tight(Sql::join(value_placeholders, ", "))
            .append_raw(format!("]::{sql_type}[]"))
    }

    fn array_contains_some(&self, column: Sql, value_placeholders: Vec<Sql>, sql_type: &str) -> Sql {
        column
            .append_raw(" && ARRAY[")
            .append_tight(Sql::join(value_placeholders, ", "))
            .append_raw(format!("]::{sql_type}[]"))
    }

    fn array_is_empty(&self, column: Sql, _sql_type: &str) -> Sql {
        column.append_raw(" = '{}'")
    }

    fn case_insensitive_like(&self, column: Sql, pattern_placeholder: Sql) -> Sql {
        column.append_raw(" ILIKE").append(pattern_placeholder)
    }

    fn json_extract_text(&self, column: Sql, json_path: &str) -> Sql {
        column.append_raw(format!("#>>'{{{json_path}}}'"))
    }

    fn json_agg(&self, expr: Sql, order_by: Option<Sql>) -> Sql {
        let mut inner = expr;
        if let Some(order) = order_by {
            inner = inner.append_raw(" ORDER BY ").append_tight(order);
        }
        Sql::raw("json_agg(").append_tight(inner).append_tight(Sql::raw(")"))
    }

    fn json_build_object(&self, pairs: Vec<(String, Sql)>) -> Sql {
        let mut parts = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            parts.push(Sql::raw(format!("'{key}',")).append(value));
        }
        Sql::raw("json_build_object(").append_tight(Sql::join(parts, ", ")).append_tight(Sql::raw(")"))
    }

    fn supports_distinct_on(&self) -> bool {
        true
    }

    fn bind_in_set(&self, column: Sql, set_placeholder: Sql) -> Sql {
        column.append_raw(" = ANY(").append_tight(set_placeholder).append_tight(Sql::raw(")"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_contains_one_renders_cast() {
        let dialect = PostgresDialect;
        let sql = dialect.array_contains_one(Sql::raw("\"t\".\"tags\""), Sql::placeholder(0), "text");
        assert_eq!(sql.render(Dialect::PostgreSQL), "\"t\".\"tags\" @> ARRAY[$1]::text[]");
    }

    #[test]
    fn json_agg_with_order() {
        let dialect = PostgresDialect;
        let sql = dialect.json_agg(Sql::raw("x"), Some(Sql::raw("\"t\".\"id\" ASC")));
        assert_eq!(sql.render(Dialect::PostgreSQL), "json_agg(x ORDER BY \"t\".\"id\" ASC)");
    }

    #[test]
    fn bind_in_set_uses_any() {
        let dialect = PostgresDialect;
        let sql = dialect.bind_in_set(Sql::raw("\"b\".\"author_id\""), Sql::placeholder(0));
        assert_eq!(sql.render(Dialect::PostgreSQL), "\"b\".\"author_id\" = ANY($1)");
    }
}
