//! Final statement assembly (spec §4.8, component C8).
//!
//! Takes the pieces the other components produce — scalar column list,
//! WHERE fragment, inline include plans, ORDER BY, LIMIT/OFFSET — and
//! composes them into one `SELECT` statement. `DISTINCT`/`DISTINCT ON`
//! emulation lives here because it interacts with every other clause:
//! PostgreSQL's native `DISTINCT ON (...)` needs its expressions to match
//! the leading `ORDER BY` terms, while SQLite has no equivalent, so this
//! wraps the core select in an outer query that filters
//! `ROW_NUMBER() OVER (PARTITION BY ...)` down to one row per distinct
//! key before applying the caller's `ORDER BY`/`LIMIT`.

use crate::args::{Method, QueryArgs};
use crate::cache::SchemaFieldCache;
use crate::context::BuildContext;
use crate::dialect::Dialect;
use crate::error::CompileError;
use crate::ident::{quote_identifier, quote_qualified, quote_table_ref};
use crate::include::{build_include, IncludePlan};
use crate::order::{build_cursor_boundary_predicate, build_cursor_cte, build_limit_offset, build_order_by, determinate_order_keys, reversed};
use crate::planner::plan_includes;
use crate::reducer::IncludeTreeMeta;
use crate::sql::Sql;

/// A fully assembled, renderable statement plus metadata the top-level
/// `compile` entry point needs to report back to the caller.
pub struct Assembled {
    pub sql: Sql,
    /// `true` when the statement contains an aggregated/lateral include
    /// (the row shape needs C10's reducer to fold child arrays back into
    /// nested objects — simple scalar-only selects don't).
    pub requires_reduction: bool,
    /// Relations the planner pulled out into separate batch queries.
    pub batch_relations: Vec<String>,
    /// `true` when the scan ran in reverse sort order to serve a
    /// negative `take`; the reducer must flip rows back to caller order.
    pub scan_reversed: bool,
    /// Path → primary-key-columns/cardinality metadata for every
    /// flat-joined (dotted-column) include, handed back as `includeSpec`
    /// (spec §6) so the caller's reducer (C10) can descend the rows.
    pub flat_join_tree: Vec<IncludeTreeMeta>,
}

fn scalar_select_columns(model_name: &str, alias: &str, args: &QueryArgs, cache: &mut SchemaFieldCache) -> Result<Vec<(String, Sql)>, CompileError> {
    let idx = cache.index(model_name)?;
    let model = idx.model();
    let names: Vec<String> = match &args.select {
        Some(fields) => fields.iter().map(|f| f.to_string()).collect(),
        None => model.fields.iter().filter(|f| !f.is_relation()).map(|f| f.name.to_string()).collect(),
    };
    names
        .into_iter()
        .map(|name| {
            let idx = cache.index(model_name)?;
            let field = idx.get(&name)?;
            Ok((name, Sql::raw(quote_qualified(alias, &field.column)?)))
        })
        .collect()
}

/// Assembles the full `SELECT` statement for `model_name` against
/// `args`, using `ctx` for schema/alias/param plumbing and dialect
/// fragment generation.
pub fn assemble(model_name: &str, method: Method, args: &QueryArgs, ctx: &mut BuildContext) -> Result<Assembled, CompileError> {
    let model = ctx.cache.model(model_name)?.clone();
    let base_alias = ctx.aliases.next(&model.table)?;
    let base_table_sql = quote_table_ref(&model.table, Some(&base_alias))?;

    let plan = plan_includes(&args.includes, &model)?;

    let mut select_list = scalar_select_columns(model_name, &base_alias, args, &mut ctx.cache)?;
    let mut from_extras: Vec<Sql> = Vec::new();
    let mut needs_group_by = false;
    let mut flat_join_tree = Vec::new();

    // Row 4 of the include predicate table (spec §4.7) only applies when
    // the outer query already caps its row count; otherwise an eagerly
    // computed aggregate is cheaper than duplicating parent rows.
    let outer_has_limit = method.is_singular() || args.pagination.take.is_some();

    for &i in &plan.inline {
        let include = &args.includes[i];
        match build_include(include, model_name, &base_alias, false, outer_has_limit, ctx)? {
            IncludePlan::Embedded { alias, expr } => {
                select_list.push((alias, expr));
            }
            IncludePlan::EmbeddedLateral {
                alias,
                from_clause,
                select_expr,
            }
            | IncludePlan::FlatAggregated {
                alias,
                from_clause,
                select_expr,
            } => {
                from_extras.push(from_clause);
                select_list.push((alias, select_expr));
                needs_group_by = true;
            }
            IncludePlan::FlatJoinReduce { from_clause, columns, tree, .. } => {
                from_extras.push(from_clause);
                select_list.extend(columns);
                flat_join_tree.push(tree);
            }
            IncludePlan::Batched { .. } => unreachable!("planner marked this include inline"),
        }
    }

    let batch_relations = plan.batched.iter().map(|b| b.relation_field.clone()).collect::<Vec<_>>();

    // Effective scan direction: a negative `take` means "last N", served
    // by reversing the sort, limiting, then letting the reducer (C10)
    // flip the page back to caller order.
    let scan_reversed = args.pagination.take.map(|t| t < 0).unwrap_or(false);
    let effective_order = if scan_reversed { reversed(&args.order_by) } else { args.order_by.clone() };

    let mut where_parts = Vec::new();
    if let Some(filter) = &args.filter {
        let result = crate::filter::build_where(
            filter,
            model_name,
            &base_alias,
            "where",
            &mut ctx.cache,
            &mut ctx.params,
            &mut ctx.aliases,
            ctx.dialect,
        )?;
        where_parts.push(result.clause);
        from_extras.extend(result.joins);
    }
    let mut cursor_cte = None;
    if let Some(cursor) = &args.pagination.cursor {
        if matches!(ctx.dialect.dialect(), Dialect::SQLite) && !args.distinct.is_empty() {
            return Err(CompileError::ValidationError(
                "cursor pagination cannot be combined with `distinct` on SQLite: the row-number emulation is incompatible with the cursor's row-exclusion predicate".into(),
            ));
        }
        let determinate_order = determinate_order_keys(&effective_order, model_name, &mut ctx.cache)?;
        let cte_alias = ctx.aliases.next("__tp_cursor")?;
        let cte = build_cursor_cte(cursor, &determinate_order, model_name, &cte_alias, &mut ctx.cache, &mut ctx.params)?;
        where_parts.push(build_cursor_boundary_predicate(&determinate_order, model_name, &base_alias, &cte_alias, &mut ctx.cache)?);
        cursor_cte = Some(cte);
    }

    let postgres_distinct_on = match ctx.dialect.dialect() {
        Dialect::PostgreSQL if !args.distinct.is_empty() => {
            let cols = args
                .distinct
                .iter()
                .map(|name| {
                    let idx = ctx.cache.index(model_name)?;
                    let field = idx.get(name)?;
                    Ok(Sql::raw(quote_qualified(&base_alias, &field.column)?))
                })
                .collect::<Result<Vec<_>, CompileError>>()?;
            Sql::raw("DISTINCT ON").append(Sql::join(cols, ", ").parenthesized())
        }
        _ => Sql::new(),
    };

    let mut core = Sql::raw("SELECT").append(postgres_distinct_on);
    let projection = Sql::join(
        select_list.iter().map(|(name, expr)| expr.clone().append_raw(format!(" AS \"{name}\""))).collect::<Vec<_>>(),
        ", ",
    );
    core = core.append(projection);
    core = core.append(Sql::raw("FROM")).append(Sql::raw(base_table_sql));
    for extra in &from_extras {
        core = core.append(extra.clone());
    }
    if !where_parts.is_empty() {
        core = core.append(Sql::raw("WHERE")).append(Sql::join(where_parts, " AND "));
    }
    if needs_group_by {
        let group_cols = group_by_columns(&model, model_name, &base_alias, &select_list, &mut ctx.cache)?;
        core = core.append(Sql::raw("GROUP BY")).append(Sql::join(group_cols, ", "));
    }

    let sqlite_distinct = matches!(ctx.dialect.dialect(), Dialect::SQLite) && !args.distinct.is_empty();
    let mut sql = if sqlite_distinct {
        wrap_with_row_number_distinct(core, &select_list, &args.distinct, &effective_order, model_name, &mut ctx.cache)?
    } else {
        core
    };

    if !effective_order.is_empty() && !sqlite_distinct {
        let order_sql = build_order_by(&effective_order, model_name, &base_alias, &mut ctx.cache, ctx.dialect.dialect())?;
        sql = sql.append(Sql::raw("ORDER BY")).append(order_sql);
    } else if sqlite_distinct && !effective_order.is_empty() {
        let order_names = Sql::join(
            effective_order
                .iter()
                .map(|k| {
                    let dir = if matches!(k.direction, crate::order::Direction::Desc) { "DESC" } else { "ASC" };
                    Sql::raw(format!("{} {dir}", quote_identifier(&k.field).unwrap_or_else(|_| format!("\"{}\"", k.field))))
                })
                .collect::<Vec<_>>(),
            ", ",
        );
        sql = sql.append(Sql::raw("ORDER BY")).append(order_names);
    }

    // `skip` is meaningless for `findUnique` (it can only ever match the
    // one row its unique filter names) and forcing it to `None` also
    // keeps it from combining with the `LIMIT 1`; `findFirst` still wants
    // it honored so a caller can page through "first match" results
    // (spec Glossary "skip").
    let take = args.pagination.take.map(|t| t.unsigned_abs());
    sql = match method {
        Method::FindUnique => sql.append(build_limit_offset(Some(1), None)),
        Method::FindFirst => sql.append(build_limit_offset(Some(1), args.pagination.skip)),
        Method::FindMany | Method::Count => sql.append(build_limit_offset(take, args.pagination.skip)),
    };

    if let Some(cte) = cursor_cte {
        sql = Sql::raw("WITH").append(cte).append(sql);
    }

    validate_assembled(&sql, ctx.dialect.dialect(), ctx.params.len())?;

    Ok(Assembled {
        sql,
        requires_reduction: needs_group_by || !args.includes.is_empty(),
        batch_relations,
        scan_reversed,
        flat_join_tree,
    })
}

/// Non-production diagnostic (spec §4.8): catches assembler bugs before
/// they reach the driver rather than validating caller input. Checks
/// that the rendered statement isn't empty, that `SELECT` precedes
/// `FROM`, and that every bound parameter is referenced by exactly the
/// contiguous run of placeholder indices `0..param_count` — a gap or
/// duplicate means a builder forgot to bind a value it claimed to, or
/// bound one it never referenced.
fn validate_assembled(sql: &Sql, dialect: Dialect, param_count: usize) -> Result<(), CompileError> {
    let rendered = sql.render(dialect);
    if rendered.trim().is_empty() {
        return Err(CompileError::Critical("assembled statement is empty".into()));
    }
    match (rendered.find("SELECT"), rendered.find("FROM")) {
        (Some(select_pos), Some(from_pos)) if select_pos < from_pos => {}
        _ => return Err(CompileError::Critical("assembled statement has no SELECT before FROM".into())),
    }
    let mut indices = sql.referenced_params();
    indices.sort_unstable();
    indices.dedup();
    let expected: Vec<usize> = (0..param_count).collect();
    if indices != expected {
        return Err(CompileError::ParamError(format!(
            "placeholder indices {indices:?} are not a contiguous 0..{param_count} run"
        )));
    }
    Ok(())
}

fn group_by_columns(
    model: &crate::schema::Model,
    model_name: &str,
    base_alias: &str,
    select_list: &[(String, Sql)],
    cache: &mut SchemaFieldCache,
) -> Result<Vec<Sql>, CompileError> {
    let mut group_cols = Vec::new();
    for pk in &model.primary_key {
        let idx = cache.index(model_name)?;
        let field = idx.get(pk)?;
        group_cols.push(Sql::raw(quote_qualified(base_alias, &field.column)?));
    }
    for (name, _) in select_list {
        if model.primary_key.iter().any(|pk| pk == name) {
            continue;
        }
        if let Ok(idx) = cache.index(model_name) {
            if let Ok(field) = idx.get(name) {
                if !field.is_relation() {
                    group_cols.push(Sql::raw(quote_qualified(base_alias, &field.column)?));
                }
            }
        }
    }
    Ok(group_cols)
}

/// Wraps `core` (the un-ordered, un-limited base select) in an outer
/// query that numbers rows within each distinct-key partition and keeps
/// only the first, emulating PostgreSQL's `DISTINCT ON` on SQLite.
fn wrap_with_row_number_distinct(
    core: Sql,
    select_list: &[(String, Sql)],
    distinct: &[compact_str::CompactString],
    order: &[crate::order::SortKey],
    model_name: &str,
    cache: &mut SchemaFieldCache,
) -> Result<Sql, CompileError> {
    let partition_cols = distinct
        .iter()
        .map(|name| {
            cache.index(model_name)?.get(name)?;
            quote_identifier(name)
        })
        .collect::<Result<Vec<_>, CompileError>>()?;
    let order_terms: Vec<String> = if order.is_empty() {
        partition_cols.clone()
    } else {
        order
            .iter()
            .map(|k| {
                let dir = if matches!(k.direction, crate::order::Direction::Desc) { "DESC" } else { "ASC" };
                format!("{} {dir}", quote_identifier(&k.field).unwrap_or_else(|_| format!("\"{}\"", k.field)))
            })
            .collect()
    };

    let inner_alias = "__distinct_base";
    let inner = Sql::raw("SELECT *,")
        .append(Sql::raw(format!(
            "ROW_NUMBER() OVER (PARTITION BY {} ORDER BY {}) AS \"__rn\"",
            partition_cols.join(", "),
            order_terms.join(", ")
        )))
        .append(Sql::raw("FROM"))
        .append(core.parenthesized())
        .append(Sql::raw(format!("AS \"{inner_alias}\"")));

    let outer_cols = Sql::join(
        select_list.iter().map(|(name, _)| Sql::raw(format!("\"{name}\""))).collect::<Vec<_>>(),
        ", ",
    );
    Ok(Sql::raw("SELECT")
        .append(outer_cols)
        .append(Sql::raw("FROM"))
        .append(inner.parenthesized())
        .append(Sql::raw(format!("AS \"{inner_alias}_outer\"")))
        .append(Sql::raw("WHERE \"__rn\" = 1")))
}
