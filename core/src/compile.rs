//! Top-level compile entry point (spec §6 external interface).

use crate::args::{Method, QueryArgs};
use crate::cache::SchemaFieldCache;
use crate::context::BuildContext;
use crate::dialect::DialectAdapter;
use crate::error::CompileError;
use crate::ident::quote_table_ref;
use crate::param::{ParamMapping, ParamStore, ParamValue};
use crate::planner::{child_limits_of, estimate_and_check_fanout, fast_path};
use crate::reducer::IncludeTreeMeta;
use crate::schema::Model;

/// One batched follow-up query the caller must execute after the
/// primary statement and feed into the reducer via
/// `Reducer::process_batched_row`, keyed on `parent_key_column`.
pub struct BatchQuery {
    pub relation_field: String,
    pub parent_key_column: String,
    pub sql: String,
    pub params: Vec<ParamValue>,
}

/// The full result of compiling one query request.
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<ParamValue>,
    /// Provenance for each bound parameter: which scope of the query
    /// tree produced it (spec §3 `ParamStore.snapshot()`).
    pub param_mappings: Vec<ParamMapping>,
    pub requires_reduction: bool,
    pub batch: Vec<BatchQuery>,
    pub scan_reversed: bool,
    /// Path → primary-key-columns/cardinality metadata for flat-joined
    /// includes (spec §6 `includeSpec`); feeds `Reducer`'s
    /// `ReductionSpec.flat_join_tree` directly.
    pub include_spec: Vec<IncludeTreeMeta>,
}

/// Compiles `args` against `model_name` for `method`, targeting
/// `dialect`. `models` is the full schema the query may reference
/// (directly or via relations reached through `include`).
pub fn compile(
    models: &[Model],
    model_name: &str,
    method: Method,
    args: &QueryArgs,
    dialect: &dyn DialectAdapter,
) -> Result<CompiledQuery, CompileError> {
    #[cfg(feature = "tracing")]
    tracing::debug!(model = model_name, ?method, "compiling query");

    let mut fast_cache = SchemaFieldCache::new(models);
    let model = fast_cache.model(model_name)?.clone();
    let mut fast_params = ParamStore::new();
    if let Some(sql) = fast_path(&model, method, args, "t", &mut fast_cache, &mut fast_params)? {
        let sql_text = sql.render(dialect.dialect());
        let (params, param_mappings) = fast_params.snapshot();

        #[cfg(feature = "tracing")]
        tracing::trace!(sql = %sql_text, "compiled statement via fast path");

        return Ok(CompiledQuery {
            sql: sql_text,
            params,
            param_mappings,
            requires_reduction: false,
            batch: Vec::new(),
            scan_reversed: false,
            include_spec: Vec::new(),
        });
    }

    let cache = SchemaFieldCache::new(models);
    let mut ctx = BuildContext::new(cache, dialect);

    estimate_and_check_fanout(args.pagination.take.map(|t| t.unsigned_abs()), &child_limits_of(args))?;

    let assembled = crate::assembly::assemble(model_name, method, args, &mut ctx)?;
    let sql_text = assembled.sql.render(dialect.dialect());

    #[cfg(feature = "tracing")]
    tracing::trace!(sql = %sql_text, param_count = ctx.params.len(), "compiled statement");

    let (params, param_mappings) = ctx.params.snapshot();

    let batch = build_batch_queries(models, model_name, args, &assembled.batch_relations, dialect)?;

    Ok(CompiledQuery {
        sql: sql_text,
        params,
        param_mappings,
        requires_reduction: assembled.requires_reduction || !batch.is_empty(),
        batch,
        scan_reversed: assembled.scan_reversed,
        include_spec: assembled.flat_join_tree,
    })
}

/// Builds one follow-up `SELECT ... WHERE parent_key IN (...)`-shaped
/// query per relation the planner decomposed. The `IN (...)` list
/// itself is filled in by the caller once the primary query's parent
/// keys are known (placeholder `$1`/`?` for a single bind, expanded to
/// N placeholders by the caller's driver layer or re-rendered per batch
/// size); here we emit the query shape with a single placeholder
/// standing for "the parent key set" since the exact row count isn't
/// known until the primary query runs.
fn build_batch_queries(
    models: &[Model],
    parent_model_name: &str,
    args: &QueryArgs,
    batch_relations: &[String],
    dialect: &dyn DialectAdapter,
) -> Result<Vec<BatchQuery>, CompileError> {
    if batch_relations.is_empty() {
        return Ok(Vec::new());
    }
    let mut cache = SchemaFieldCache::new(models);
    let parent_model = cache.model(parent_model_name)?;

    let mut out = Vec::with_capacity(batch_relations.len());
    for relation_field in batch_relations {
        let idx = cache.index(parent_model_name)?;
        let field = idx.get(relation_field)?;
        let crate::schema::FieldType::Relation {
            target_model,
            foreign_key,
            references,
            is_foreign_key_local,
            ..
        } = &field.field_type
        else {
            return Err(CompileError::RelationError(format!(
                "`{relation_field}` on `{parent_model_name}` is not a relation"
            )));
        };
        // The bind-set predicate must target whichever side of the
        // relation physically stores the foreign key, which isn't
        // always the related table.
        let (parent_col, related_col) = if *is_foreign_key_local {
            (foreign_key.as_str(), references.as_str())
        } else {
            (references.as_str(), foreign_key.as_str())
        };

        let include = args
            .includes
            .iter()
            .find(|inc| inc.relation_field.as_str() == relation_field.as_str())
            .expect("batch_relations only names includes present in args");

        let related = cache.model(target_model)?;
        let related_alias = "b";
        let table_sql = quote_table_ref(&related.table, Some(related_alias))?;

        let mut sub_ctx = BuildContext::new(SchemaFieldCache::new(models), dialect);
        let fk_column_sql = crate::ident::quote_qualified(related_alias, related_col)?;

        let mut extra_joins = Vec::new();
        let mut where_sql = dialect.bind_in_set(crate::sql::Sql::raw(fk_column_sql), crate::sql::Sql::placeholder(0));
        if let Some(filter) = &include.args.filter {
            let scope = format!("include.{relation_field}.where");
            let result = crate::filter::build_where(
                filter,
                target_model,
                related_alias,
                &scope,
                &mut sub_ctx.cache,
                &mut sub_ctx.params,
                &mut sub_ctx.aliases,
                dialect,
            )?;
            where_sql = crate::sql::Sql::join(vec![where_sql, result.clause], " AND ");
            extra_joins = result.joins;
        }

        let columns = related
            .fields
            .iter()
            .filter(|f| !f.is_relation())
            .map(|f| {
                crate::ident::quote_qualified(related_alias, &f.column)
                    .map(|c| format!("{c} AS \"{}\"", f.name))
            })
            .collect::<Result<Vec<_>, CompileError>>()?;

        let mut sql = crate::sql::Sql::raw("SELECT").append(crate::sql::Sql::raw(columns.join(", "))).append(crate::sql::Sql::raw("FROM")).append(crate::sql::Sql::raw(table_sql));
        for join in extra_joins {
            sql = sql.append(join);
        }
        sql = sql.append(crate::sql::Sql::raw("WHERE")).append(where_sql);

        if !include.args.order_by.is_empty() {
            let order_sql = crate::order::build_order_by(&include.args.order_by, target_model, related_alias, &mut sub_ctx.cache, dialect.dialect())?;
            sql = sql.append(crate::sql::Sql::raw("ORDER BY")).append(order_sql);
        }

        // Reserve placeholder index 0 for the parent-key-set bind; shift
        // any params this sub-query accumulated past it.
        let rendered = sql.render(dialect.dialect());
        let mut all_params = vec![ParamValue::Array(Vec::new())]; // placeholder for the IN-set, filled by the caller
        all_params.extend(sub_ctx.params.into_values());

        let _ = parent_model; // validated relation exists on parent above
        out.push(BatchQuery {
            relation_field: relation_field.clone(),
            parent_key_column: parent_col.to_string(),
            sql: rendered,
            params: all_params,
        });
    }
    Ok(out)
}
