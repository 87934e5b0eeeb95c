//! ORDER BY, pagination, and cursor encoding (spec §4.6, component C6).
//!
//! Cursor pagination follows a CTE-based keyset recipe rather than
//! binding the boundary row's column values directly: an auxiliary CTE
//! selects the single row matching the caller's partial cursor key, and
//! the outer query's boundary predicate references that CTE's columns.
//! This keeps the predicate correct even when the cursor key names only
//! a subset of the declared `orderBy` (the common case — a cursor on
//! `id` with an `orderBy` of `[createdAt, id]` still needs every
//! ordering column's value from the anchor row, not just `id`'s).

use compact_str::CompactString;

use crate::cache::SchemaFieldCache;
use crate::dialect::{Dialect, DialectAdapter};
use crate::error::CompileError;
use crate::ident::{quote_qualified, quote_table_ref};
use crate::param::{ParamStore, ParamValue};
use crate::sql::Sql;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One key in an ORDER BY list.
#[derive(Debug, Clone)]
pub struct SortKey {
    pub field: CompactString,
    pub direction: Direction,
    /// `None` means "use the dialect default for this direction".
    pub nulls_first: Option<bool>,
}

impl SortKey {
    pub fn new(field: impl Into<CompactString>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
            nulls_first: None,
        }
    }
}

/// Pagination parameters. A negative `take` reverses both the scan
/// direction and the sort order, then the reducer (C10) flips the result
/// rows back to caller-declared order before returning — this lets
/// "give me the last N" be expressed without a second round trip.
///
/// `cursor` is a partial key (`{ field: value, ... }`, spec §4.6) naming
/// the anchor row, not a positional tuple matching `orderBy` — it may
/// name fewer fields than `orderBy` (typically just the primary key),
/// since the anchor row's other sort-column values are recovered by the
/// cursor CTE rather than supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub take: Option<i64>,
    pub skip: Option<u64>,
    pub cursor: Option<Vec<(CompactString, ParamValue)>>,
}

/// Extends `keys` with the model's primary key as a trailing tie-break
/// wherever it isn't already present, so pagination (and cursor
/// boundary comparisons, which rely on the same column list) stays
/// deterministic (spec testable property "determinism under pagination").
pub fn determinate_order_keys(keys: &[SortKey], model_name: &str, cache: &mut SchemaFieldCache) -> Result<Vec<SortKey>, CompileError> {
    let mut out: Vec<SortKey> = keys.to_vec();
    let model = cache.model(model_name)?;
    for pk_column in &model.primary_key {
        let idx = cache.index(model_name)?;
        let pk_field = idx
            .get(pk_column)
            .unwrap_or_else(|_| panic!("primary key column `{pk_column}` missing from model `{model_name}`"));
        if !out.iter().any(|k| k.field == pk_field.name) {
            out.push(SortKey::new(pk_field.name.clone(), Direction::Asc));
        }
    }
    Ok(out)
}

/// Builds the `ORDER BY ...` clause (without the keyword) for `keys`,
/// qualifying each column against `table_alias` and appending the
/// model's primary key as a trailing tie-break.
pub fn build_order_by(
    keys: &[SortKey],
    model_name: &str,
    table_alias: &str,
    cache: &mut SchemaFieldCache,
    dialect: Dialect,
) -> Result<Sql, CompileError> {
    let determinate = determinate_order_keys(keys, model_name, cache)?;
    let parts = determinate
        .iter()
        .map(|key| render_sort_key(key, model_name, table_alias, cache, dialect))
        .collect::<Result<Vec<_>, CompileError>>()?;
    Ok(Sql::join(parts, ", "))
}

fn render_sort_key(
    key: &SortKey,
    model_name: &str,
    table_alias: &str,
    cache: &mut SchemaFieldCache,
    dialect: Dialect,
) -> Result<Sql, CompileError> {
    let idx = cache.index(model_name)?;
    let field = idx.get(&key.field)?;
    if field.is_relation() {
        return Err(CompileError::scalar_required(model_name, &key.field));
    }
    let column_sql = quote_qualified(table_alias, &field.column)?;
    let direction = match key.direction {
        Direction::Asc => "ASC",
        Direction::Desc => "DESC",
    };
    let nulls_first = key
        .nulls_first
        .unwrap_or_else(|| dialect.default_nulls_first(matches!(key.direction, Direction::Asc)));
    let nulls = if nulls_first { "NULLS FIRST" } else { "NULLS LAST" };
    Ok(Sql::raw(format!("{column_sql} {direction} {nulls}")))
}

/// Flips every sort key's direction, for the negative-`take` "last N"
/// case: the scan runs in reverse so `LIMIT` takes the tail, and the
/// reducer restores forward order afterward.
pub fn reversed(keys: &[SortKey]) -> Vec<SortKey> {
    keys.iter()
        .map(|k| SortKey {
            field: k.field.clone(),
            direction: match k.direction {
                Direction::Asc => Direction::Desc,
                Direction::Desc => Direction::Asc,
            },
            nulls_first: k.nulls_first.map(|nf| !nf),
        })
        .collect()
}

/// Builds the cursor CTE: `<cte_alias> AS (SELECT <order cols, aliased
/// c0, c1, ...> FROM <table> WHERE <cursor-key equality> LIMIT 1)`.
/// `order_keys` must already be the determinate (tie-break-appended)
/// list so its column set matches what [`build_cursor_boundary_predicate`]
/// expects.
pub fn build_cursor_cte(
    cursor: &[(CompactString, ParamValue)],
    order_keys: &[SortKey],
    model_name: &str,
    cte_alias: &str,
    cache: &mut SchemaFieldCache,
    params: &mut ParamStore,
) -> Result<Sql, CompileError> {
    if cursor.is_empty() {
        return Err(CompileError::InvalidValue("cursor must name at least one field".into()));
    }
    let row_alias = "__tp_cursor_row";
    let table_sql = {
        let model = cache.model(model_name)?;
        quote_table_ref(&model.table, Some(row_alias))?
    };

    let mut predicate_parts = Vec::with_capacity(cursor.len());
    for (field_name, value) in cursor {
        let idx = cache.index(model_name)?;
        let field = idx.get(field_name)?;
        if field.is_relation() {
            return Err(CompileError::scalar_required(model_name, field_name));
        }
        let column_sql = quote_qualified(row_alias, &field.column)?;
        let placeholder = Sql::placeholder(params.add(value.clone()));
        predicate_parts.push(Sql::raw(column_sql).append_raw(" =").append(placeholder));
    }
    let predicate = Sql::join(predicate_parts, " AND ");

    let mut select_cols = Vec::with_capacity(order_keys.len());
    for (i, key) in order_keys.iter().enumerate() {
        let idx = cache.index(model_name)?;
        let field = idx.get(&key.field)?;
        if field.is_relation() {
            return Err(CompileError::scalar_required(model_name, &key.field));
        }
        let column_sql = quote_qualified(row_alias, &field.column)?;
        select_cols.push(format!("{column_sql} AS \"c{i}\""));
    }

    let inner = Sql::raw("SELECT")
        .append(Sql::raw(select_cols.join(", ")))
        .append(Sql::raw("FROM"))
        .append(Sql::raw(table_sql))
        .append(Sql::raw("WHERE"))
        .append(predicate)
        .append(Sql::raw("LIMIT 1"));

    Ok(Sql::raw(format!("{cte_alias} AS")).append(inner.parenthesized()))
}

/// Builds the boundary predicate `EXISTS(cte) AND (disjunction OR row
/// equals cursor)` (spec §4.6): the anchor row itself is always
/// included in the window, and every subsequent row must be strictly
/// past it in declared order.
///
/// TODO: extend the per-column comparisons with NULLS FIRST/LAST-aware
/// boundary checks once a dialect-neutral null-safe comparison
/// primitive exists; today this assumes non-null sort columns, matching
/// the row-value-comparison predicate it replaces.
pub fn build_cursor_boundary_predicate(
    order_keys: &[SortKey],
    model_name: &str,
    table_alias: &str,
    cte_alias: &str,
    cache: &mut SchemaFieldCache,
) -> Result<Sql, CompileError> {
    let mut columns = Vec::with_capacity(order_keys.len());
    let mut cte_cols = Vec::with_capacity(order_keys.len());
    for (i, key) in order_keys.iter().enumerate() {
        let idx = cache.index(model_name)?;
        let field = idx.get(&key.field)?;
        columns.push(Sql::raw(quote_qualified(table_alias, &field.column)?));
        cte_cols.push(Sql::raw(format!("{cte_alias}.\"c{i}\"")));
    }

    let mut disjuncts = Vec::with_capacity(order_keys.len());
    for i in 0..order_keys.len() {
        let mut conjuncts = Vec::with_capacity(i + 1);
        for (col, cte_col) in columns.iter().take(i).zip(cte_cols.iter().take(i)) {
            conjuncts.push(col.clone().append_raw(" =").append(cte_col.clone()));
        }
        let op = match order_keys[i].direction {
            Direction::Desc => "<",
            Direction::Asc => ">",
        };
        conjuncts.push(columns[i].clone().append_raw(format!(" {op} ")).append(cte_cols[i].clone()));
        disjuncts.push(Sql::join(conjuncts, " AND ").parenthesized());
    }
    let past_cursor = Sql::join(disjuncts, " OR ");

    let equals_cursor = Sql::join(
        columns
            .iter()
            .zip(cte_cols.iter())
            .map(|(c, cte_c)| c.clone().append_raw(" =").append(cte_c.clone()))
            .collect::<Vec<_>>(),
        " AND ",
    );

    let window = Sql::join(vec![past_cursor, equals_cursor], " OR ").parenthesized();
    let exists = Sql::raw(format!("EXISTS (SELECT 1 FROM {cte_alias})"));
    Ok(exists.append_raw(" AND ").append(window))
}

/// Renders `LIMIT`/`OFFSET` for a pagination spec. A negative `take` has
/// already been normalized to its absolute value with the sort reversed
/// by the time this is called; callers pass the absolute limit here.
pub fn build_limit_offset(take: Option<u64>, skip: Option<u64>) -> Sql {
    let mut sql = Sql::new();
    if let Some(limit) = take {
        sql = sql.append(Sql::raw(format!("LIMIT {limit}")));
    }
    if let Some(offset) = skip {
        if offset > 0 {
            sql = sql.append(Sql::raw(format!("OFFSET {offset}")));
        }
    }
    sql
}
