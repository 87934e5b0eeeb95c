//! Query planner (spec §4.9, component C9).
//!
//! Decides, for a given top-level query, which of its `include`d
//! relations get embedded inline (via C7's aggregated/lateral shapes)
//! versus decomposed into a separate batched `WHERE parent_id IN (...)`
//! query. Multiple unpaginated to-many includes on the same parent are
//! the case that forces decomposition: aggregating two list relations
//! inline means two independent joins against the same parent row,
//! multiplying fanout by each other (a parent with 50 posts and 50
//! comments turns into 2500 joined rows before `json_agg` collapses them
//! back down) — batching keeps each relation's fanout independent.

use crate::args::{Method, QueryArgs};
use crate::cache::SchemaFieldCache;
use crate::error::CompileError;
use crate::filter::{FilterNode, ScalarOp};
use crate::ident::{quote_qualified, quote_table_ref};
use crate::include::IncludeSpec;
use crate::limits::{HARD_FANOUT_CAP, MAX_INCLUDES, MAX_SUBQUERIES};
use crate::order::build_limit_offset;
use crate::param::{ArgValue, ParamStore};
use crate::schema::{Cardinality, Model};
use crate::sql::Sql;

/// One unpaginated to-many include the planner has decided to run as a
/// separate query, batched over all parent primary keys from the
/// top-level result.
#[derive(Debug, Clone)]
pub struct WhereInSegment {
    pub relation_field: String,
    pub parent_key_column: String,
}

/// The planner's verdict for one top-level query: which includes stay
/// inline and which get decomposed into batch segments.
pub struct Plan {
    pub inline: Vec<usize>,
    pub batched: Vec<WhereInSegment>,
}

/// Counts how many of `includes` are to-many relations with no
/// `take`/`skip` of their own — the ones eligible for either inline
/// aggregation or batching.
fn unpaginated_list_count(includes: &[IncludeSpec], model: &Model) -> Result<usize, CompileError> {
    let mut count = 0;
    for include in includes {
        let field = model
            .find_field(&include.relation_field)
            .ok_or_else(|| CompileError::field_not_found(&model.name, &include.relation_field, &model.field_names()))?;
        if let crate::schema::FieldType::Relation { cardinality, .. } = &field.field_type {
            if matches!(cardinality, Cardinality::Many)
                && include.args.pagination.take.is_none()
                && include.args.pagination.skip.is_none()
            {
                count += 1;
            }
        }
    }
    Ok(count)
}

/// Builds the inline/batched split for `includes` against `model`.
///
/// Rule: when two or more unpaginated to-many includes are requested on
/// the same parent, all but the first are decomposed into batch
/// segments (the first stays inline to keep the common single-relation
/// case a single round trip). Paginated to-many includes (lateral shape)
/// and to-one includes are never batched; they embed regardless of how
/// many siblings are present since they don't multiply fanout the same
/// way once properly aggregated or singular.
pub fn plan_includes(includes: &[IncludeSpec], model: &Model) -> Result<Plan, CompileError> {
    if includes.len() > MAX_INCLUDES {
        return Err(CompileError::Critical(format!(
            "query requests {} includes, exceeding the cap of {MAX_INCLUDES}",
            includes.len()
        )));
    }
    let unpaginated_lists = unpaginated_list_count(includes, model)?;

    let mut inline = Vec::with_capacity(includes.len());
    let mut batched = Vec::new();
    let mut unpaginated_seen = 0usize;

    for (i, include) in includes.iter().enumerate() {
        let field = model.find_field(&include.relation_field).expect("validated above");
        let is_unpaginated_list = matches!(&field.field_type, crate::schema::FieldType::Relation { cardinality, .. } if matches!(cardinality, Cardinality::Many))
            && include.args.pagination.take.is_none()
            && include.args.pagination.skip.is_none();

        if is_unpaginated_list {
            unpaginated_seen += 1;
            if unpaginated_lists > 1 && unpaginated_seen > 1 {
                let crate::schema::FieldType::Relation { references, .. } = &field.field_type else {
                    unreachable!()
                };
                batched.push(WhereInSegment {
                    relation_field: include.relation_field.to_string(),
                    parent_key_column: references.to_string(),
                });
                continue;
            }
        }
        inline.push(i);
    }

    if batched.len() > MAX_SUBQUERIES {
        return Err(CompileError::Critical(format!(
            "planner would emit {} batched subqueries, exceeding the cap of {MAX_SUBQUERIES}",
            batched.len()
        )));
    }

    Ok(Plan { inline, batched })
}

/// Rough upper bound on result-row fanout for a query with the given
/// per-parent estimated child counts (one entry per inline to-many
/// lateral/aggregated include), used to refuse plans that would explode
/// past [`HARD_FANOUT_CAP`] before ever touching the database.
///
/// `estimated_parent_rows` should come from the query's own `take`/limit
/// when known; `None` is treated conservatively as "unbounded" and skips
/// the check (the cap still applies to the includes' own internal limits
/// where they have one).
pub fn estimate_and_check_fanout(estimated_parent_rows: Option<u64>, child_limits: &[u64]) -> Result<(), CompileError> {
    let Some(parent_rows) = estimated_parent_rows else {
        return Ok(());
    };
    let mut fanout = parent_rows;
    for &limit in child_limits {
        fanout = fanout.saturating_mul(limit.max(1));
        if fanout > HARD_FANOUT_CAP {
            return Err(CompileError::Critical(format!(
                "estimated fanout {fanout} exceeds the hard cap of {HARD_FANOUT_CAP}; narrow the query or paginate its includes"
            )));
        }
    }
    Ok(())
}

/// Convenience used by `compile` to turn a query's top-level pagination
/// and its inline lateral includes' own limits into the inputs
/// `estimate_and_check_fanout` expects.
pub fn child_limits_of(args: &QueryArgs) -> Vec<u64> {
    args.includes
        .iter()
        .filter_map(|inc| inc.args.pagination.take.map(|t| t.unsigned_abs()))
        .collect()
}

fn select_all_scalars(model: &Model, table_alias: &str) -> Result<Sql, CompileError> {
    let cols = model
        .fields
        .iter()
        .filter(|f| !f.is_relation())
        .map(|f| quote_qualified(table_alias, &f.column).map(|c| format!("{c} AS \"{}\"", f.name)))
        .collect::<Result<Vec<_>, CompileError>>()?;
    Ok(Sql::raw(cols.join(", ")))
}

fn canned_eq_where(
    model: &Model,
    table_alias: &str,
    field: &str,
    value: &ArgValue,
    cache: &mut SchemaFieldCache,
    params: &mut ParamStore,
) -> Result<Sql, CompileError> {
    let idx = cache.index(&model.name)?;
    let f = idx.get(field)?;
    if f.is_relation() {
        return Err(CompileError::scalar_required(&model.name, field));
    }
    let column_sql = quote_qualified(table_alias, &f.column)?;
    let param_idx = params.add_auto_scoped(value, format!("where.{field}"))?;
    Ok(Sql::raw(column_sql).append_raw(" =").append(Sql::placeholder(param_idx)))
}

/// Bypasses the general assembler for a small, enumerated set of shapes
/// cheap enough to emit as a canned template (spec §4.9 "Fast path"):
/// `findUnique` by a single scalar equality, `findMany` by primary-key
/// equality with no other options, `count(*)` with no `where`, and
/// `findMany` with only a `LIMIT`. Returns `None` when `args` doesn't
/// match one of these shapes, letting the caller fall through to
/// `assemble`.
pub fn fast_path(
    model: &Model,
    method: Method,
    args: &QueryArgs,
    table_alias: &str,
    cache: &mut SchemaFieldCache,
    params: &mut ParamStore,
) -> Result<Option<Sql>, CompileError> {
    if !args.includes.is_empty() || !args.order_by.is_empty() || !args.distinct.is_empty() || args.pagination.cursor.is_some() {
        return Ok(None);
    }

    let single_scalar_eq = match &args.filter {
        Some(FilterNode::Scalar {
            field,
            op: ScalarOp::Eq,
            value,
            insensitive: false,
        }) => Some((field.as_str(), value)),
        _ => None,
    };

    let table_sql = quote_table_ref(&model.table, Some(table_alias))?;

    match method {
        Method::FindUnique => {
            let Some((field, value)) = single_scalar_eq else {
                return Ok(None);
            };
            if args.pagination.skip.is_some() || args.pagination.take.is_some() {
                return Ok(None);
            }
            let select_sql = select_all_scalars(model, table_alias)?;
            let where_sql = canned_eq_where(model, table_alias, field, value, cache, params)?;
            Ok(Some(
                Sql::raw("SELECT")
                    .append(select_sql)
                    .append(Sql::raw("FROM"))
                    .append(Sql::raw(table_sql))
                    .append(Sql::raw("WHERE"))
                    .append(where_sql)
                    .append(Sql::raw("LIMIT 1")),
            ))
        }
        Method::FindMany => {
            if let Some((field, value)) = single_scalar_eq {
                if args.pagination.take.is_some() || args.pagination.skip.is_some() || !model.primary_key.iter().any(|pk| pk == field) {
                    return Ok(None);
                }
                let select_sql = select_all_scalars(model, table_alias)?;
                let where_sql = canned_eq_where(model, table_alias, field, value, cache, params)?;
                return Ok(Some(
                    Sql::raw("SELECT")
                        .append(select_sql)
                        .append(Sql::raw("FROM"))
                        .append(Sql::raw(table_sql))
                        .append(Sql::raw("WHERE"))
                        .append(where_sql),
                ));
            }
            if args.filter.is_none() && args.pagination.take.is_some() && args.pagination.skip.is_none() {
                let take = args.pagination.take.expect("checked above").unsigned_abs();
                let select_sql = select_all_scalars(model, table_alias)?;
                return Ok(Some(
                    Sql::raw("SELECT")
                        .append(select_sql)
                        .append(Sql::raw("FROM"))
                        .append(Sql::raw(table_sql))
                        .append(build_limit_offset(Some(take), None)),
                ));
            }
            Ok(None)
        }
        Method::Count => {
            if args.filter.is_some() {
                return Ok(None);
            }
            Ok(Some(Sql::raw("SELECT COUNT(*) AS \"count\" FROM").append(Sql::raw(table_sql))))
        }
        Method::FindFirst => Ok(None),
    }
}
