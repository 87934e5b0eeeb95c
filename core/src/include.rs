//! Include/select builder (spec §4.7, component C7).
//!
//! Chooses and renders one of four shapes for a nested relation
//! (spec §4.7 predicate table):
//!
//! - a to-one relation becomes a correlated scalar subquery with a
//!   `COALESCE` default (`build_to_one`);
//! - a to-many relation with no pagination of its own, at the root of
//!   the query tree, with no outer `LIMIT` and no deeper nesting,
//!   becomes a flat `LEFT JOIN` to a pre-aggregated `GROUP BY`
//!   sub-select (`build_flat_aggregated`) — cheaper than a correlated
//!   subquery per parent row;
//! - a to-many relation that *does* specify `take`/`skip` needs
//!   per-parent-row limiting, which plain aggregation can't express, so
//!   it becomes a `LATERAL` join windowed per parent
//!   (`build_to_many_lateral`);
//! - a to-many relation at the root with no pagination, no deeper
//!   nesting, but an outer `LIMIT` already in play, becomes a single
//!   flat (non-aggregating) `LEFT JOIN` whose duplicated, dotted-name
//!   rows the reducer (C10) folds back together client-side
//!   (`build_flat_join_reduce`) — an aggregating sub-select computed
//!   before the outer `LIMIT` is applied would do wasted work for rows
//!   the `LIMIT` discards;
//! - everything else (deeper nesting, SQLite, or just the safe default)
//!   falls back to the correlated `json_agg` subquery
//!   (`build_to_many_aggregated`).
//!
//! When a query has more than one unpaginated to-many include, the
//! planner (C9) pulls them out of the main statement entirely into
//! separate batched `WHERE parent_id IN (...)` queries reduced back
//! together client-side, to avoid multiplying row fanout across sibling
//! one-to-many joins.

use compact_str::CompactString;

use crate::alias::AliasGenerator;
use crate::args::QueryArgs;
use crate::cache::SchemaFieldCache;
use crate::context::BuildContext;
use crate::dialect::Dialect;
use crate::error::CompileError;
use crate::filter::build_where;
use crate::ident::{quote_identifier, quote_qualified, quote_table_ref};
use crate::order::{build_limit_offset, build_order_by};
use crate::reducer::IncludeTreeMeta;
use crate::schema::{Cardinality, FieldType};
use crate::sql::Sql;

/// A caller-requested nested relation, with its own query arguments.
#[derive(Debug, Clone)]
pub struct IncludeSpec {
    pub relation_field: CompactString,
    pub args: Box<QueryArgs>,
}

impl IncludeSpec {
    pub fn new(relation_field: impl Into<CompactString>, args: QueryArgs) -> Self {
        Self {
            relation_field: relation_field.into(),
            args: Box::new(args),
        }
    }

    fn has_own_pagination(&self) -> bool {
        self.args.pagination.take.is_some() || self.args.pagination.skip.is_some()
    }

    fn is_shallow(&self) -> bool {
        self.args.includes.is_empty()
    }
}

/// The shape chosen for one include, handed back to the planner so it
/// can decide between embedding the fragment in the main statement or
/// decomposing it into a batch query.
pub enum IncludePlan {
    /// Embeddable `Sql` expression selected as an extra output column.
    Embedded { alias: String, expr: Sql },
    /// A to-many include with its own `take`/`skip`: a `LATERAL` join
    /// clause that must be spliced into the parent's `FROM` list, paired
    /// with the aggregate expression selected alongside the parent's own
    /// columns.
    EmbeddedLateral {
        alias: String,
        from_clause: Sql,
        select_expr: Sql,
    },
    /// A to-many include resolved as a flat `LEFT JOIN` to a `GROUP BY`
    /// sub-select, one output row per parent regardless of fanout.
    /// Structurally identical to `EmbeddedLateral`'s payload, kept as its
    /// own variant because the shapes are selected for different reasons
    /// and the assembler logs/handles them distinctly.
    FlatAggregated {
        alias: String,
        from_clause: Sql,
        select_expr: Sql,
    },
    /// A to-many include resolved as a single non-aggregating `LEFT
    /// JOIN`: the join multiplies parent rows per matching child, and
    /// the selected columns carry dotted `relation.column` names for the
    /// reducer (C10) to fold back into a nested array client-side.
    FlatJoinReduce {
        relation_field: CompactString,
        from_clause: Sql,
        columns: Vec<(String, Sql)>,
        /// Path → primary-key-columns/cardinality metadata the reducer
        /// (C10) needs to descend the dotted columns above; handed back
        /// to the caller as part of `includeSpec` (spec §6).
        tree: IncludeTreeMeta,
    },
    /// This include needs to run as its own follow-up query, keyed by
    /// the parent's primary key, because the parent query already has
    /// too many sibling list includes to aggregate them all inline
    /// without a combinatorial join explosion.
    Batched {
        relation_field: CompactString,
        parent_key_column: CompactString,
    },
}

/// Resolves which physical column belongs to the parent side and which
/// to the related side of a relation, honoring `isForeignKeyLocal`
/// (spec §3, §4.7 point 2): when the parent model owns the foreign key
/// column, the parent's join column is `foreign_key` and the related
/// side's is `references`; otherwise it's flipped.
fn relation_columns(foreign_key: &str, references: &str, is_foreign_key_local: bool) -> (String, String) {
    if is_foreign_key_local {
        (foreign_key.to_string(), references.to_string())
    } else {
        (references.to_string(), foreign_key.to_string())
    }
}

/// Renders one include as either an embedded column expression or a
/// signal that it must be batched, given whether the caller has already
/// decided (via the planner) that this include should be decomposed.
/// `outer_has_limit` tells the flat-join-vs-flat-aggregate choice
/// whether the enclosing query already caps its row count with a
/// `LIMIT` (spec §4.7 predicate table row 4).
#[allow(clippy::too_many_arguments)]
pub fn build_include(
    include: &IncludeSpec,
    parent_model: &str,
    parent_alias: &str,
    force_batch: bool,
    outer_has_limit: bool,
    ctx: &mut BuildContext,
) -> Result<IncludePlan, CompileError> {
    let (target_model, foreign_key, references, cardinality, is_foreign_key_local) = {
        let idx = ctx.cache.index(parent_model)?;
        let field = idx.get(&include.relation_field)?;
        match &field.field_type {
            FieldType::Relation {
                target_model,
                foreign_key,
                references,
                cardinality,
                is_foreign_key_local,
            } => (
                target_model.to_string(),
                foreign_key.to_string(),
                references.to_string(),
                *cardinality,
                *is_foreign_key_local,
            ),
            _ => {
                return Err(CompileError::RelationError(format!(
                    "`{}` on `{parent_model}` is not a relation",
                    include.relation_field
                )))
            }
        }
    };

    if force_batch && matches!(cardinality, Cardinality::Many) {
        return Ok(IncludePlan::Batched {
            relation_field: include.relation_field.clone(),
            parent_key_column: references.into(),
        });
    }

    let at_root = ctx.depth() == 0;
    let shallow = include.is_shallow();

    ctx.with_deeper(|ctx| match cardinality {
        Cardinality::One => build_to_one(include, &target_model, &foreign_key, &references, is_foreign_key_local, parent_alias, ctx),
        Cardinality::Many if include.has_own_pagination() => {
            build_to_many_lateral(include, &target_model, &foreign_key, &references, is_foreign_key_local, parent_alias, ctx)
        }
        Cardinality::Many if at_root && shallow && !outer_has_limit => {
            build_flat_aggregated(include, &target_model, &foreign_key, &references, is_foreign_key_local, parent_alias, ctx)
        }
        Cardinality::Many if at_root && shallow && outer_has_limit => {
            build_flat_join_reduce(include, &target_model, &foreign_key, &references, is_foreign_key_local, parent_alias, ctx)
        }
        Cardinality::Many => {
            build_to_many_aggregated(include, &target_model, &foreign_key, &references, is_foreign_key_local, parent_alias, ctx)
        }
    })
}

fn select_columns(model_name: &str, alias: &str, select: &Option<Vec<CompactString>>, ctx: &mut BuildContext) -> Result<Vec<(String, Sql)>, CompileError> {
    let idx = ctx.cache.index(model_name)?;
    let model = idx.model();
    let names: Vec<CompactString> = match select {
        Some(fields) => fields.clone(),
        None => model.fields.iter().filter(|f| !f.is_relation()).map(|f| f.name.clone()).collect(),
    };
    names
        .iter()
        .map(|name| {
            let idx = ctx.cache.index(model_name)?;
            let field = idx.get(name)?;
            if field.is_relation() {
                return Err(CompileError::scalar_required(model_name, name));
            }
            Ok((name.to_string(), Sql::raw(quote_qualified(alias, &field.column)?)))
        })
        .collect()
}

fn build_to_one(
    include: &IncludeSpec,
    target_model: &str,
    foreign_key: &str,
    references: &str,
    is_foreign_key_local: bool,
    parent_alias: &str,
    ctx: &mut BuildContext,
) -> Result<IncludePlan, CompileError> {
    let related = ctx.cache.model(target_model)?;
    let alias = ctx.aliases.next(&related.table)?;
    let table_sql = quote_table_ref(&related.table, Some(&alias))?;
    let (parent_col, related_col) = relation_columns(foreign_key, references, is_foreign_key_local);

    let join_condition = Sql::raw(quote_qualified(&alias, &related_col)?)
        .append_raw(" =")
        .append(Sql::raw(quote_qualified(parent_alias, &parent_col)?));
    let where_sql = match &include.args.filter {
        Some(node) => {
            let scope = format!("include.{}.where", include.relation_field);
            let result = build_where(node, target_model, &alias, &scope, &mut ctx.cache, &mut ctx.params, &mut ctx.aliases, ctx.dialect)?;
            Sql::join(vec![join_condition, result.clause], " AND ")
        }
        None => join_condition,
    };

    let columns = select_columns(target_model, &alias, &include.args.select, ctx)?;
    let object_expr = ctx.dialect.json_build_object(columns);

    let body = Sql::raw("SELECT")
        .append(object_expr)
        .append(Sql::raw("FROM"))
        .append(Sql::raw(table_sql))
        .append(Sql::raw("WHERE"))
        .append(where_sql)
        .append(Sql::raw("LIMIT 1"));

    let out_alias = ctx.aliases.next(&format!("{}_json", include.relation_field))?;
    Ok(IncludePlan::Embedded {
        alias: out_alias,
        expr: body.parenthesized(),
    })
}

fn build_to_many_aggregated(
    include: &IncludeSpec,
    target_model: &str,
    foreign_key: &str,
    references: &str,
    is_foreign_key_local: bool,
    parent_alias: &str,
    ctx: &mut BuildContext,
) -> Result<IncludePlan, CompileError> {
    let related = ctx.cache.model(target_model)?;
    let alias = ctx.aliases.next(&related.table)?;
    let table_sql = quote_table_ref(&related.table, Some(&alias))?;
    let (parent_col, related_col) = relation_columns(foreign_key, references, is_foreign_key_local);

    let join_condition = Sql::raw(quote_qualified(&alias, &related_col)?)
        .append_raw(" =")
        .append(Sql::raw(quote_qualified(parent_alias, &parent_col)?));
    let where_sql = match &include.args.filter {
        Some(node) => {
            let scope = format!("include.{}.where", include.relation_field);
            let result = build_where(node, target_model, &alias, &scope, &mut ctx.cache, &mut ctx.params, &mut ctx.aliases, ctx.dialect)?;
            Sql::join(vec![join_condition, result.clause], " AND ")
        }
        None => join_condition,
    };

    let columns = select_columns(target_model, &alias, &include.args.select, ctx)?;
    let object_expr = ctx.dialect.json_build_object(columns);
    let order_by = if include.args.order_by.is_empty() {
        None
    } else {
        Some(build_order_by(&include.args.order_by, target_model, &alias, &mut ctx.cache, ctx.dialect.dialect())?)
    };
    let agg_expr = ctx.dialect.json_agg(object_expr, order_by);
    let coalesced = ctx.dialect.coalesce_empty_array(agg_expr);

    let body = Sql::raw("SELECT")
        .append(coalesced)
        .append(Sql::raw("FROM"))
        .append(Sql::raw(table_sql))
        .append(Sql::raw("WHERE"))
        .append(where_sql);

    let out_alias = ctx.aliases.next(&format!("{}_json", include.relation_field))?;
    Ok(IncludePlan::Embedded {
        alias: out_alias,
        expr: body.parenthesized(),
    })
}

fn build_to_many_lateral(
    include: &IncludeSpec,
    target_model: &str,
    foreign_key: &str,
    references: &str,
    is_foreign_key_local: bool,
    parent_alias: &str,
    ctx: &mut BuildContext,
) -> Result<IncludePlan, CompileError> {
    let related = ctx.cache.model(target_model)?;
    let alias = ctx.aliases.next(&related.table)?;
    let table_sql = quote_table_ref(&related.table, Some(&alias))?;
    let (parent_col, related_col) = relation_columns(foreign_key, references, is_foreign_key_local);

    let join_condition = Sql::raw(quote_qualified(&alias, &related_col)?)
        .append_raw(" =")
        .append(Sql::raw(quote_qualified(parent_alias, &parent_col)?));
    let where_sql = match &include.args.filter {
        Some(node) => {
            let scope = format!("include.{}.where", include.relation_field);
            let result = build_where(node, target_model, &alias, &scope, &mut ctx.cache, &mut ctx.params, &mut ctx.aliases, ctx.dialect)?;
            Sql::join(vec![join_condition, result.clause], " AND ")
        }
        None => join_condition,
    };

    let order_by = if include.args.order_by.is_empty() {
        None
    } else {
        Some(build_order_by(&include.args.order_by, target_model, &alias, &mut ctx.cache, ctx.dialect.dialect())?)
    };

    let take = include.args.pagination.take.unwrap_or(i64::MAX).unsigned_abs();
    let limit_offset = build_limit_offset(Some(take), include.args.pagination.skip);

    let mut inner = Sql::raw("SELECT *").append(Sql::raw("FROM")).append(Sql::raw(table_sql)).append(Sql::raw("WHERE")).append(where_sql);
    if let Some(ob) = order_by {
        inner = inner.append(Sql::raw("ORDER BY")).append(ob);
    }
    inner = inner.append(limit_offset);

    let lateral_alias = ctx.aliases.next(&format!("{}_lat", include.relation_field))?;
    let lateral_clause = Sql::raw("LEFT JOIN LATERAL")
        .append(inner.parenthesized())
        .append(Sql::raw("AS"))
        .append(Sql::raw(quote_identifier(&lateral_alias)?))
        .append(Sql::raw("ON TRUE"));

    let columns = select_columns(target_model, &lateral_alias, &include.args.select, ctx)?;
    let object_expr = ctx.dialect.json_build_object(columns);
    let agg_expr = ctx.dialect.json_agg(object_expr, None);
    let coalesced = ctx.dialect.coalesce_empty_array(agg_expr);

    let out_alias = ctx.aliases.next(&format!("{}_json", include.relation_field))?;
    Ok(IncludePlan::EmbeddedLateral {
        alias: out_alias,
        from_clause: lateral_clause,
        select_expr: coalesced,
    })
}

/// Flat left-join to a `GROUP BY` sub-select (spec §4.7 predicate table
/// row 1): one aggregated JSON array per distinct parent key, joined in
/// once rather than correlated per row. Cheaper than
/// `build_to_many_aggregated` when there's no outer `LIMIT` to make an
/// eagerly-computed aggregate wasteful.
fn build_flat_aggregated(
    include: &IncludeSpec,
    target_model: &str,
    foreign_key: &str,
    references: &str,
    is_foreign_key_local: bool,
    parent_alias: &str,
    ctx: &mut BuildContext,
) -> Result<IncludePlan, CompileError> {
    let related = ctx.cache.model(target_model)?;
    let alias = ctx.aliases.next(&related.table)?;
    let table_sql = quote_table_ref(&related.table, Some(&alias))?;
    let (parent_col, related_col) = relation_columns(foreign_key, references, is_foreign_key_local);

    let where_sql = match &include.args.filter {
        Some(node) => {
            let scope = format!("include.{}.where", include.relation_field);
            build_where(node, target_model, &alias, &scope, &mut ctx.cache, &mut ctx.params, &mut ctx.aliases, ctx.dialect)?.clause
        }
        None => Sql::new(),
    };

    let columns = select_columns(target_model, &alias, &include.args.select, ctx)?;
    let object_expr = ctx.dialect.json_build_object(columns);
    let order_by = if include.args.order_by.is_empty() {
        None
    } else {
        Some(build_order_by(&include.args.order_by, target_model, &alias, &mut ctx.cache, ctx.dialect.dialect())?)
    };
    let agg_expr = ctx.dialect.json_agg(object_expr, order_by);

    let fk_alias = ctx.aliases.next("fk")?;
    let agg_alias = ctx.aliases.next("agg")?;
    let group_col = Sql::raw(quote_qualified(&alias, &related_col)?);
    let select_list = Sql::join(
        vec![
            group_col.clone().append_raw(" AS ").append_tight(Sql::raw(quote_identifier(&fk_alias)?)),
            agg_expr.append_raw(" AS ").append_tight(Sql::raw(quote_identifier(&agg_alias)?)),
        ],
        ", ",
    );
    let mut subq = Sql::raw("SELECT").append(select_list).append(Sql::raw("FROM")).append(Sql::raw(table_sql));
    if !where_sql.is_empty() {
        subq = subq.append(Sql::raw("WHERE")).append(where_sql);
    }
    subq = subq.append(Sql::raw("GROUP BY")).append(group_col);

    let subq_alias = ctx.aliases.next(&format!("{}_agg", include.relation_field))?;
    let join_clause = Sql::raw("LEFT JOIN")
        .append(subq.parenthesized())
        .append(Sql::raw("AS"))
        .append(Sql::raw(quote_identifier(&subq_alias)?))
        .append(Sql::raw("ON"))
        .append(Sql::raw(quote_qualified(&subq_alias, &fk_alias)?))
        .append_raw(" =")
        .append(Sql::raw(quote_qualified(parent_alias, &parent_col)?));

    let coalesced = ctx.dialect.coalesce_empty_array(Sql::raw(quote_qualified(&subq_alias, &agg_alias)?));
    let out_alias = ctx.aliases.next(&format!("{}_json", include.relation_field))?;
    Ok(IncludePlan::FlatAggregated {
        alias: out_alias,
        from_clause: join_clause,
        select_expr: coalesced,
    })
}

/// Single non-aggregating `LEFT JOIN` (spec §4.7 predicate table row 4):
/// used only when the outer query already has a `LIMIT`, so an eagerly
/// computed aggregate sub-select would do work for rows the `LIMIT`
/// discards. Duplicates parent rows per matching child; the reducer
/// (C10) folds the dotted `relation.column` output back into a nested
/// array.
fn build_flat_join_reduce(
    include: &IncludeSpec,
    target_model: &str,
    foreign_key: &str,
    references: &str,
    is_foreign_key_local: bool,
    parent_alias: &str,
    ctx: &mut BuildContext,
) -> Result<IncludePlan, CompileError> {
    let related = ctx.cache.model(target_model)?;
    let alias = ctx.aliases.next(&related.table)?;
    let table_sql = quote_table_ref(&related.table, Some(&alias))?;
    let (parent_col, related_col) = relation_columns(foreign_key, references, is_foreign_key_local);

    let base_join_condition = Sql::raw(quote_qualified(&alias, &related_col)?)
        .append_raw(" =")
        .append(Sql::raw(quote_qualified(parent_alias, &parent_col)?));
    let on_condition = match &include.args.filter {
        Some(node) => {
            let scope = format!("include.{}.where", include.relation_field);
            let result = build_where(node, target_model, &alias, &scope, &mut ctx.cache, &mut ctx.params, &mut ctx.aliases, ctx.dialect)?;
            Sql::join(vec![base_join_condition, result.clause], " AND ")
        }
        None => base_join_condition,
    };
    let join_clause = Sql::raw("LEFT JOIN").append(Sql::raw(table_sql)).append(Sql::raw("ON")).append(on_condition);

    let scalar_columns = select_columns(target_model, &alias, &include.args.select, ctx)?;
    let dotted_columns = scalar_columns
        .into_iter()
        .map(|(name, expr)| (format!("{}.{name}", include.relation_field), expr))
        .collect();

    let tree = IncludeTreeMeta::new(include.relation_field.to_string(), related.primary_key.iter().map(|pk| pk.to_string()).collect(), Cardinality::Many);

    Ok(IncludePlan::FlatJoinReduce {
        relation_field: include.relation_field.clone(),
        from_clause: join_clause,
        columns: dotted_columns,
        tree,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DialectAdapter;
    use crate::schema::{Field, Model};

    struct StubDialect;
    impl DialectAdapter for StubDialect {
        fn dialect(&self) -> Dialect {
            Dialect::PostgreSQL
        }
        fn array_contains_one(&self, c: Sql, v: Sql, _t: &str) -> Sql {
            c.append(v)
        }
        fn array_contains_all(&self, c: Sql, _v: Vec<Sql>, _t: &str) -> Sql {
            c
        }
        fn array_contains_some(&self, c: Sql, _v: Vec<Sql>, _t: &str) -> Sql {
            c
        }
        fn array_is_empty(&self, c: Sql, _t: &str) -> Sql {
            c
        }
        fn case_insensitive_like(&self, c: Sql, p: Sql) -> Sql {
            c.append(p)
        }
        fn json_extract_text(&self, c: Sql, _p: &str) -> Sql {
            c
        }
        fn json_agg(&self, expr: Sql, _o: Option<Sql>) -> Sql {
            Sql::raw("json_agg(").append_tight(expr).append_tight(Sql::raw(")"))
        }
        fn json_build_object(&self, pairs: Vec<(String, Sql)>) -> Sql {
            let mut parts = Vec::new();
            for (k, v) in pairs {
                parts.push(Sql::raw(format!("'{k}',")).append(v));
            }
            Sql::raw("json_build_object(").append_tight(Sql::join(parts, ", ")).append_tight(Sql::raw(")"))
        }
        fn supports_distinct_on(&self) -> bool {
            true
        }
        fn bind_in_set(&self, column: Sql, set_placeholder: Sql) -> Sql {
            column.append_raw(" = ANY(").append(set_placeholder).append_raw(")")
        }
    }

    fn models() -> Vec<Model> {
        let user = Model::new("User", "users")
            .field(Field::new("id", "id", FieldType::Int))
            .field(Field::new(
                "posts",
                "posts",
                FieldType::Relation {
                    target_model: "Post".into(),
                    foreign_key: "author_id".into(),
                    references: "id".into(),
                    cardinality: Cardinality::Many,
                    is_foreign_key_local: false,
                },
            ))
            .primary_key(vec!["id".into()]);
        let post = Model::new("Post", "posts")
            .field(Field::new("id", "id", FieldType::Int))
            .field(Field::new("authorId", "author_id", FieldType::Int))
            .field(Field::new("title", "title", FieldType::String))
            .primary_key(vec!["id".into()]);
        vec![user, post]
    }

    #[test]
    fn to_many_at_root_without_limit_flat_aggregates() {
        let models = models();
        let cache = SchemaFieldCache::new(&models);
        let stub = StubDialect;
        let mut ctx = BuildContext::new(cache, &stub);
        let include = IncludeSpec::new("posts", QueryArgs::new());
        let plan = build_include(&include, "User", "u", false, false, &mut ctx).unwrap();
        match plan {
            IncludePlan::FlatAggregated { from_clause, select_expr, .. } => {
                let joined = from_clause.render(Dialect::PostgreSQL);
                assert!(joined.contains("LEFT JOIN"));
                assert!(joined.contains("GROUP BY"));
                assert!(select_expr.render(Dialect::PostgreSQL).contains("json_agg"));
            }
            _ => panic!("expected flat-aggregated plan"),
        }
    }

    #[test]
    fn to_many_at_root_with_outer_limit_flat_joins_and_reduces() {
        let models = models();
        let cache = SchemaFieldCache::new(&models);
        let stub = StubDialect;
        let mut ctx = BuildContext::new(cache, &stub);
        let include = IncludeSpec::new("posts", QueryArgs::new());
        let plan = build_include(&include, "User", "u", false, true, &mut ctx).unwrap();
        match plan {
            IncludePlan::FlatJoinReduce { from_clause, columns, relation_field, tree } => {
                assert!(from_clause.render(Dialect::PostgreSQL).contains("LEFT JOIN"));
                assert!(!columns.is_empty());
                assert_eq!(relation_field, "posts");
                assert!(columns.iter().all(|(name, _)| name.starts_with("posts.")));
                assert_eq!(tree.alias, "posts");
                assert_eq!(tree.primary_key_columns, vec!["id".to_string()]);
            }
            _ => panic!("expected flat-join-reduce plan"),
        }
    }

    #[test]
    fn nested_include_falls_back_to_correlated_aggregate() {
        let models = models();
        let cache = SchemaFieldCache::new(&models);
        let stub = StubDialect;
        let mut ctx = BuildContext::new(cache, &stub);
        ctx.with_deeper(|ctx| {
            let include = IncludeSpec::new("posts", QueryArgs::new());
            let plan = build_include(&include, "User", "u", false, false, ctx).unwrap();
            match plan {
                IncludePlan::Embedded { expr, .. } => {
                    assert!(expr.render(Dialect::PostgreSQL).contains("json_agg"));
                }
                _ => panic!("expected embedded (correlated aggregate) plan"),
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn force_batch_yields_batched_plan_for_many() {
        let models = models();
        let cache = SchemaFieldCache::new(&models);
        let stub = StubDialect;
        let mut ctx = BuildContext::new(cache, &stub);
        let include = IncludeSpec::new("posts", QueryArgs::new());
        let plan = build_include(&include, "User", "u", true, false, &mut ctx).unwrap();
        assert!(matches!(plan, IncludePlan::Batched { .. }));
    }
}
