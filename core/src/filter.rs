//! Filter tree and WHERE-clause builder (spec §4.5, component C5).
//!
//! `FilterNode` is the normalized shape a caller's nested `where` object
//! parses into; translating it into a `Sql` fragment is structurally the
//! same recursive descent as `chiselstrike`'s
//! `datastore/src/filter.rs::to_expr_rec` and
//! `datastore/src/datastore/query.rs::filter_expr_to_string`, generalized
//! from chiselstrike's fixed operator set to cover the relation
//! (`some`/`every`/`none`/`is`/`isNot`), array
//! (`has`/`hasEvery`/`hasSome`/`isEmpty`), and JSON path operators this
//! spec adds.

use crate::alias::AliasGenerator;
use crate::cache::SchemaFieldCache;
use crate::dialect::DialectAdapter;
use crate::error::CompileError;
use crate::ident::quote_qualified;
use crate::limits::MAX_FILTER_DEPTH;
use crate::param::{ArgValue, ParamStore};
use crate::schema::{Cardinality, Field, FieldType};
use crate::sql::Sql;

/// Scalar comparison operators (spec §4.5 operator table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Raw `LIKE`/`ILIKE` pattern match; the pattern is taken as-is, no
    /// wildcard templating. Kept distinct from `Contains`/`StartsWith`/
    /// `EndsWith` below, which do template the value.
    Like,
    ILike,
    In,
    NotIn,
    /// `%value%`, templated by the compiler before binding.
    Contains,
    /// `value%`, templated by the compiler before binding.
    StartsWith,
    /// `%value`, templated by the compiler before binding.
    EndsWith,
}

impl ScalarOp {
    fn is_wildcard_template(self) -> bool {
        matches!(self, ScalarOp::Contains | ScalarOp::StartsWith | ScalarOp::EndsWith)
    }
}

/// Array-column operators, dispatched to the dialect adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOp {
    Has,
    HasEvery,
    HasSome,
    IsEmpty,
}

/// JSON path operators (spec §4.5 "JSON operators"): extract `path` out
/// of a JSON column via [`DialectAdapter::json_extract_text`], then test
/// the extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonOp {
    StringContains,
    StringStartsWith,
    StringEndsWith,
}

/// Relation-filter quantifiers. `Some`/`Every`/`None` apply to to-many
/// relation fields; `Is`/`IsNot` apply to to-one relation fields (a bare
/// relation object in the caller's request is parsed as `Is` shorthand).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    Every,
    None,
    Is,
    IsNot,
}

impl Quantifier {
    fn requires_many(self) -> bool {
        matches!(self, Quantifier::Some | Quantifier::Every | Quantifier::None)
    }
}

/// A normalized node of a `where` filter tree.
#[derive(Debug, Clone)]
pub enum FilterNode {
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
    Scalar {
        field: String,
        op: ScalarOp,
        value: ArgValue,
        /// `mode: insensitive` (spec §4.5): case-folds the comparison.
        /// Only meaningful for `Eq`/`Ne`/`Like`/`Contains`/`StartsWith`/
        /// `EndsWith`; ignored otherwise.
        insensitive: bool,
    },
    IsNull {
        field: String,
        is_null: bool,
    },
    Array {
        field: String,
        op: ArrayOp,
        value: ArgValue,
    },
    Json {
        field: String,
        op: JsonOp,
        path: String,
        value: ArgValue,
    },
    Relation {
        field: String,
        quantifier: Quantifier,
        nested: Box<FilterNode>,
    },
}

impl FilterNode {
    fn depth(&self) -> usize {
        match self {
            FilterNode::And(children) | FilterNode::Or(children) => {
                1 + children.iter().map(FilterNode::depth).max().unwrap_or(0)
            }
            FilterNode::Not(inner) => 1 + inner.depth(),
            FilterNode::Relation { nested, .. } => 1 + nested.depth(),
            FilterNode::Scalar { .. } | FilterNode::IsNull { .. } | FilterNode::Array { .. } | FilterNode::Json { .. } => 1,
        }
    }

    /// `true` for the empty-conjunction filter (`{}` on the wire), the
    /// trigger for the `none: {}` -> `LEFT JOIN ... IS NULL` rewrite
    /// (spec §4.5, scenario 6).
    fn is_empty(&self) -> bool {
        matches!(self, FilterNode::And(children) if children.is_empty())
    }
}

/// The WHERE builder's output contract (spec §4.5): a boolean clause plus
/// any auxiliary `LEFT JOIN`/`INNER JOIN` fragments the assembler must
/// splice into `FROM` before `WHERE`.
pub struct WhereResult {
    pub clause: Sql,
    pub joins: Vec<Sql>,
}

/// Builds a WHERE-clause fragment (without the `WHERE` keyword) for
/// `node`, evaluated against `table_alias` in `model_name`'s shape.
///
/// Relation filters translate into `EXISTS`/`NOT EXISTS` correlated
/// subqueries against the related table, matching the join-avoidance
/// strategy the planner (C9) otherwise uses for list includes — a
/// `some`/`none` filter doesn't need its rows in the result set, only
/// their existence. The one exception is the empty-filter `none: {}`
/// case, which the assembler can satisfy more cheaply with a `LEFT JOIN`
/// and a null check; that rewrite surfaces through `joins` here.
pub fn build_where(
    node: &FilterNode,
    model_name: &str,
    table_alias: &str,
    scope: &str,
    cache: &mut SchemaFieldCache,
    params: &mut ParamStore,
    aliases: &mut AliasGenerator,
    dialect: &dyn DialectAdapter,
) -> Result<WhereResult, CompileError> {
    if node.depth() > MAX_FILTER_DEPTH {
        return Err(CompileError::Critical(format!(
            "filter tree exceeds max depth of {MAX_FILTER_DEPTH}"
        )));
    }
    let mut joins = Vec::new();
    let clause = build_where_rec(node, model_name, table_alias, scope, cache, params, aliases, dialect, &mut joins)?;
    Ok(WhereResult { clause, joins })
}

#[allow(clippy::too_many_arguments)]
fn build_where_rec(
    node: &FilterNode,
    model_name: &str,
    table_alias: &str,
    scope: &str,
    cache: &mut SchemaFieldCache,
    params: &mut ParamStore,
    aliases: &mut AliasGenerator,
    dialect: &dyn DialectAdapter,
    joins: &mut Vec<Sql>,
) -> Result<Sql, CompileError> {
    match node {
        FilterNode::And(children) => combine(children, "AND", model_name, table_alias, scope, cache, params, aliases, dialect, joins),
        FilterNode::Or(children) => combine(children, "OR", model_name, table_alias, scope, cache, params, aliases, dialect, joins),
        FilterNode::Not(inner) => {
            let inner_sql = build_where_rec(inner, model_name, table_alias, &format!("{scope}.not"), cache, params, aliases, dialect, joins)?;
            Ok(Sql::raw("NOT").append(inner_sql.parenthesized()))
        }
        FilterNode::IsNull { field, is_null } => {
            let column_sql = qualified_column(model_name, table_alias, field, cache)?;
            let keyword = if *is_null { "IS NULL" } else { "IS NOT NULL" };
            Ok(Sql::raw(column_sql).append_raw(" ").append_raw(keyword))
        }
        FilterNode::Scalar {
            field,
            op,
            value,
            insensitive,
        } => build_scalar(model_name, table_alias, field, *op, value, *insensitive, &format!("{scope}.{field}"), cache, params, dialect),
        FilterNode::Array { field, op, value } => {
            build_array(model_name, table_alias, field, *op, value, &format!("{scope}.{field}"), cache, params, dialect)
        }
        FilterNode::Json { field, op, path, value } => {
            build_json(model_name, table_alias, field, *op, path, value, &format!("{scope}.{field}"), cache, params, dialect)
        }
        FilterNode::Relation {
            field,
            quantifier,
            nested,
        } => build_relation(
            model_name,
            table_alias,
            field,
            *quantifier,
            nested,
            &format!("{scope}.{field}"),
            cache,
            params,
            aliases,
            dialect,
            joins,
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn combine(
    children: &[FilterNode],
    joiner: &'static str,
    model_name: &str,
    table_alias: &str,
    scope: &str,
    cache: &mut SchemaFieldCache,
    params: &mut ParamStore,
    aliases: &mut AliasGenerator,
    dialect: &dyn DialectAdapter,
    joins: &mut Vec<Sql>,
) -> Result<Sql, CompileError> {
    if children.is_empty() {
        // Empty AND is vacuously true, empty OR is vacuously false.
        return Ok(Sql::raw(if joiner == "AND" { "TRUE" } else { "FALSE" }));
    }
    let mut parts = Vec::with_capacity(children.len());
    for (i, child) in children.iter().enumerate() {
        let child_scope = format!("{scope}.{}.{i}", joiner.to_ascii_lowercase());
        let part = build_where_rec(child, model_name, table_alias, &child_scope, cache, params, aliases, dialect, joins)?;
        parts.push(part.parenthesized());
    }
    Ok(Sql::join(parts, &format!(" {joiner} ")))
}

fn qualified_column(
    model_name: &str,
    table_alias: &str,
    field: &str,
    cache: &mut SchemaFieldCache,
) -> Result<String, CompileError> {
    let idx = cache.index(model_name)?;
    let f = idx.get(field)?;
    if f.is_relation() {
        return Err(CompileError::scalar_required(model_name, field));
    }
    quote_qualified(table_alias, &f.column)
}

fn field_lookup<'a>(model_name: &str, field: &str, cache: &'a mut SchemaFieldCache) -> Result<&'a Field, CompileError> {
    let idx = cache.index(model_name)?;
    let f = idx.get(field)?;
    if f.is_relation() {
        return Err(CompileError::scalar_required(model_name, field));
    }
    Ok(f)
}

/// Templates a wildcard scalar op's literal value with `%` around it
/// (spec §4.5 "wildcard operators add `%` per the ... template; value is
/// still a parameter").
fn wildcard_value(op: ScalarOp, value: &ArgValue) -> Result<ArgValue, CompileError> {
    let ArgValue::Str(s) = value else {
        return Err(CompileError::InvalidValue("contains/startsWith/endsWith require a string value".into()));
    };
    let templated = match op {
        ScalarOp::Contains => format!("%{s}%"),
        ScalarOp::StartsWith => format!("{s}%"),
        ScalarOp::EndsWith => format!("%{s}"),
        _ => unreachable!(),
    };
    Ok(ArgValue::Str(templated))
}

#[allow(clippy::too_many_arguments)]
fn build_scalar(
    model_name: &str,
    table_alias: &str,
    field: &str,
    op: ScalarOp,
    value: &ArgValue,
    insensitive: bool,
    scope: &str,
    cache: &mut SchemaFieldCache,
    params: &mut ParamStore,
    dialect: &dyn DialectAdapter,
) -> Result<Sql, CompileError> {
    let f = field_lookup(model_name, field, cache)?;
    let nullable = f.nullable;
    let column_sql = Sql::raw(quote_qualified(table_alias, &f.column)?);
    match op {
        ScalarOp::In | ScalarOp::NotIn => {
            let ArgValue::List(items) = value else {
                return Err(CompileError::InvalidValue(format!(
                    "`{field}`: `in`/`notIn` requires a list value"
                )));
            };
            if items.is_empty() {
                // Empty IN-list is vacuously false; NOT IN vacuously true.
                return Ok(Sql::raw(if matches!(op, ScalarOp::In) { "FALSE" } else { "TRUE" }));
            }
            let placeholders = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let idx = params.add_auto_scoped(item, format!("{scope}.{i}"))?;
                    Ok(Sql::placeholder(idx))
                })
                .collect::<Result<Vec<_>, CompileError>>()?;
            let keyword = if matches!(op, ScalarOp::In) { "IN" } else { "NOT IN" };
            Ok(column_sql.append_raw(format!(" {keyword} ")).append_tight(Sql::join(placeholders, ", ").parenthesized()))
        }
        ScalarOp::Like | ScalarOp::ILike => {
            let idx = params.add_auto_scoped(value, scope)?;
            let fragment = if insensitive || matches!(op, ScalarOp::ILike) {
                dialect.case_insensitive_like(column_sql, Sql::placeholder(idx))
            } else {
                dialect.like(column_sql, Sql::placeholder(idx))
            };
            Ok(fragment)
        }
        op if op.is_wildcard_template() => {
            let templated = wildcard_value(op, value)?;
            let idx = params.add_auto_scoped(&templated, scope)?;
            let fragment = if insensitive {
                dialect.case_insensitive_like(column_sql, Sql::placeholder(idx))
            } else {
                dialect.like(column_sql, Sql::placeholder(idx))
            };
            Ok(fragment)
        }
        ScalarOp::Ne if nullable => {
            // `not <v>` on a nullable scalar must also match rows where the
            // column is NULL, since NULL <> v is itself NULL/unknown, not
            // true (spec §4.5 emission rule).
            let idx = params.add_auto_scoped(value, scope)?;
            let ne = column_sql.clone().append_raw(" <> ").append(Sql::placeholder(idx));
            let is_null = column_sql.append_raw(" IS NULL");
            Ok(Sql::join(vec![ne, is_null], " OR ").parenthesized())
        }
        _ => {
            let idx = params.add_auto_scoped(value, scope)?;
            let operator = match op {
                ScalarOp::Eq => "=",
                ScalarOp::Ne => "<>",
                ScalarOp::Gt => ">",
                ScalarOp::Gte => ">=",
                ScalarOp::Lt => "<",
                ScalarOp::Lte => "<=",
                _ => unreachable!(),
            };
            Ok(column_sql.append_raw(format!(" {operator} ")).append(Sql::placeholder(idx)))
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_array(
    model_name: &str,
    table_alias: &str,
    field: &str,
    op: ArrayOp,
    value: &ArgValue,
    scope: &str,
    cache: &mut SchemaFieldCache,
    params: &mut ParamStore,
    dialect: &dyn DialectAdapter,
) -> Result<Sql, CompileError> {
    let idx = cache.index(model_name)?;
    let f = idx.get(field)?;
    if !f.is_list {
        return Err(CompileError::InvalidOperator(format!(
            "`{field}` on `{model_name}` is not a list field; array operators don't apply"
        )));
    }
    let column_sql = Sql::raw(quote_qualified(table_alias, &f.column)?);
    let sql_type = scalar_sql_type(&f.field_type);
    match op {
        ArrayOp::IsEmpty => Ok(dialect.array_is_empty(column_sql, sql_type)),
        ArrayOp::Has => {
            let idx = params.add_auto_scoped(value, scope)?;
            Ok(dialect.array_contains_one(column_sql, Sql::placeholder(idx), sql_type))
        }
        ArrayOp::HasEvery | ArrayOp::HasSome => {
            let ArgValue::List(items) = value else {
                return Err(CompileError::InvalidValue(format!(
                    "`{field}`: `hasEvery`/`hasSome` requires a list value"
                )));
            };
            let placeholders = items
                .iter()
                .enumerate()
                .map(|(i, item)| params.add_auto_scoped(item, format!("{scope}.{i}")).map(Sql::placeholder))
                .collect::<Result<Vec<_>, CompileError>>()?;
            Ok(if matches!(op, ArrayOp::HasEvery) {
                dialect.array_contains_all(column_sql, placeholders, sql_type)
            } else {
                dialect.array_contains_some(column_sql, placeholders, sql_type)
            })
        }
    }
}

/// Rejects anything beyond a conservative safe subset for a JSON path
/// fragment embedded directly into dialect SQL (`col#>>path` on
/// Postgres): alphanumerics, `_`, `.`, `[`, `]`, `-`. No quotes,
/// semicolons, or whitespace, which would let a caller break out of the
/// path argument.
fn assert_safe_json_path(path: &str) -> Result<(), CompileError> {
    let safe = !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']' | '-'));
    if !safe {
        return Err(CompileError::ValidationError(format!("unsafe JSON path `{path}`")));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_json(
    model_name: &str,
    table_alias: &str,
    field: &str,
    op: JsonOp,
    path: &str,
    value: &ArgValue,
    scope: &str,
    cache: &mut SchemaFieldCache,
    params: &mut ParamStore,
    dialect: &dyn DialectAdapter,
) -> Result<Sql, CompileError> {
    assert_safe_json_path(path)?;
    let idx = cache.index(model_name)?;
    let f = idx.get(field)?;
    if !matches!(f.field_type, FieldType::Json) {
        return Err(CompileError::InvalidOperator(format!(
            "`{field}` on `{model_name}` is not a JSON field; JSON operators don't apply"
        )));
    }
    let column_sql = Sql::raw(quote_qualified(table_alias, &f.column)?);
    let extracted = dialect.json_extract_text(column_sql, path);
    let ArgValue::Str(s) = value else {
        return Err(CompileError::InvalidValue(format!(
            "`{field}`: `string_contains`/`string_starts_with`/`string_ends_with` require a string value"
        )));
    };
    let templated = match op {
        JsonOp::StringContains => format!("%{s}%"),
        JsonOp::StringStartsWith => format!("{s}%"),
        JsonOp::StringEndsWith => format!("%{s}"),
    };
    let idx = params.add_auto_scoped(&ArgValue::Str(templated), scope)?;
    Ok(dialect.like(extracted, Sql::placeholder(idx)))
}

fn scalar_sql_type(field_type: &FieldType) -> &'static str {
    match field_type {
        FieldType::String => "text",
        FieldType::Int => "integer",
        FieldType::Float => "double precision",
        FieldType::Decimal => "numeric",
        FieldType::Bool => "boolean",
        FieldType::BigInt => "bigint",
        FieldType::DateTime => "timestamp",
        FieldType::Json => "jsonb",
        FieldType::Enum(_) => "text",
        FieldType::Relation { .. } => "text",
    }
}

/// Derives the join predicate between `table_alias` (the model owning
/// `field`) and `related_alias`, accounting for which side physically
/// holds the foreign key column (spec §3 `isForeignKeyLocal`, §4.7
/// point 2).
fn join_condition(
    table_alias: &str,
    related_alias: &str,
    foreign_key: &str,
    references: &str,
    is_foreign_key_local: bool,
) -> Result<Sql, CompileError> {
    if is_foreign_key_local {
        Ok(Sql::raw(quote_qualified(table_alias, foreign_key)?)
            .append_raw(" =")
            .append(Sql::raw(quote_qualified(related_alias, references)?)))
    } else {
        Ok(Sql::raw(quote_qualified(related_alias, foreign_key)?)
            .append_raw(" =")
            .append(Sql::raw(quote_qualified(table_alias, references)?)))
    }
}

#[allow(clippy::too_many_arguments)]
fn build_relation(
    model_name: &str,
    table_alias: &str,
    field: &str,
    quantifier: Quantifier,
    nested: &FilterNode,
    scope: &str,
    cache: &mut SchemaFieldCache,
    params: &mut ParamStore,
    aliases: &mut AliasGenerator,
    dialect: &dyn DialectAdapter,
    joins: &mut Vec<Sql>,
) -> Result<Sql, CompileError> {
    let (target_model, foreign_key, references, cardinality, is_foreign_key_local) = {
        let idx = cache.index(model_name)?;
        let f = idx.get(field)?;
        match &f.field_type {
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
            _ => return Err(CompileError::InvalidOperator(format!("`{field}` on `{model_name}` is not a relation"))),
        }
    };
    if quantifier.requires_many() && !matches!(cardinality, Cardinality::Many) {
        return Err(CompileError::InvalidOperator(format!(
            "`some`/`every`/`none` require a to-many relation; `{field}` is to-one"
        )));
    }
    if !quantifier.requires_many() && !matches!(cardinality, Cardinality::One) {
        return Err(CompileError::InvalidOperator(format!(
            "`is`/`isNot` require a to-one relation; `{field}` is to-many"
        )));
    }
    let related = cache.model(&target_model)?;

    match quantifier {
        Quantifier::None if nested.is_empty() => {
            let related_alias = aliases.next(&related.table)?;
            let related_table_sql = crate::ident::quote_table_ref(&related.table, Some(&related_alias))?;
            let join_cond = join_condition(table_alias, &related_alias, &foreign_key, &references, is_foreign_key_local)?;
            joins.push(Sql::raw("LEFT JOIN").append(Sql::raw(related_table_sql)).append(Sql::raw("ON")).append(join_cond));
            let null_check_col = if is_foreign_key_local {
                quote_qualified(&related_alias, &references)?
            } else {
                quote_qualified(&related_alias, &foreign_key)?
            };
            Ok(Sql::raw(null_check_col).append_raw(" IS NULL"))
        }
        Quantifier::Some | Quantifier::None | Quantifier::Is | Quantifier::IsNot => {
            let related_alias = aliases.next(&related.table)?;
            let related_table_sql = crate::ident::quote_table_ref(&related.table, Some(&related_alias))?;
            let join_cond = join_condition(table_alias, &related_alias, &foreign_key, &references, is_foreign_key_local)?;
            let nested_sql = build_where_rec(nested, &target_model, &related_alias, scope, cache, params, aliases, dialect, joins)?;
            let correlated_where = Sql::join(vec![join_cond, nested_sql], " AND ");
            let exists_body = Sql::raw("SELECT 1 FROM")
                .append(Sql::raw(related_table_sql))
                .append(Sql::raw("WHERE"))
                .append(correlated_where);
            let keyword = if matches!(quantifier, Quantifier::Some | Quantifier::Is) {
                "EXISTS"
            } else {
                "NOT EXISTS"
            };
            Ok(Sql::raw(keyword).append(exists_body.parenthesized()))
        }
        Quantifier::Every => {
            // `every` holds iff there is no counterexample: no related row
            // satisfying the join condition but failing the nested filter.
            let related_alias = aliases.next(&related.table)?;
            let related_table_sql = crate::ident::quote_table_ref(&related.table, Some(&related_alias))?;
            let join_cond = join_condition(table_alias, &related_alias, &foreign_key, &references, is_foreign_key_local)?;
            let negated_nested = Sql::raw("NOT").append(
                build_where_rec(nested, &target_model, &related_alias, scope, cache, params, aliases, dialect, joins)?.parenthesized(),
            );
            let counterexample_where = Sql::join(vec![join_cond, negated_nested], " AND ");
            let body = Sql::raw("SELECT 1 FROM")
                .append(Sql::raw(related_table_sql))
                .append(Sql::raw("WHERE"))
                .append(counterexample_where);
            Ok(Sql::raw("NOT EXISTS").append(body.parenthesized()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Dialect, DialectAdapter};
    use crate::schema::{Field, Model};

    struct StubDialect;
    impl DialectAdapter for StubDialect {
        fn dialect(&self) -> Dialect {
            Dialect::PostgreSQL
        }
        fn array_contains_one(&self, column: Sql, value: Sql, _t: &str) -> Sql {
            column.append_raw(" @>").append(value)
        }
        fn array_contains_all(&self, column: Sql, _v: Vec<Sql>, _t: &str) -> Sql {
            column
        }
        fn array_contains_some(&self, column: Sql, _v: Vec<Sql>, _t: &str) -> Sql {
            column
        }
        fn array_is_empty(&self, column: Sql, _t: &str) -> Sql {
            column.append_raw(" = '{}'")
        }
        fn case_insensitive_like(&self, column: Sql, pattern: Sql) -> Sql {
            column.append_raw(" ILIKE").append(pattern)
        }
        fn json_extract_text(&self, column: Sql, p: &str) -> Sql {
            column.append_raw(format!("#>>'{{{p}}}'"))
        }
        fn json_agg(&self, expr: Sql, _o: Option<Sql>) -> Sql {
            expr
        }
        fn json_build_object(&self, _p: Vec<(String, Sql)>) -> Sql {
            Sql::new()
        }
        fn supports_distinct_on(&self) -> bool {
            true
        }
        fn bind_in_set(&self, column: Sql, set_placeholder: Sql) -> Sql {
            column.append_raw(" = ANY(").append(set_placeholder).append_raw(")")
        }
    }

    fn user_model() -> Model {
        Model::new("User", "users")
            .field(Field::new("id", "id", FieldType::Int))
            .field(Field::new("email", "email", FieldType::String))
            .field(Field::new("bio", "bio", FieldType::String).optional())
            .field(Field::new("meta", "meta", FieldType::Json))
            .field(Field::new(
                "country",
                "country",
                FieldType::Relation {
                    target_model: "Country".into(),
                    foreign_key: "country_id".into(),
                    references: "id".into(),
                    cardinality: Cardinality::One,
                    is_foreign_key_local: true,
                },
            ))
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
    }

    fn country_model() -> Model {
        Model::new("Country", "countries").field(Field::new("id", "id", FieldType::Int))
    }

    fn post_model() -> Model {
        Model::new("Post", "posts")
            .field(Field::new("id", "id", FieldType::Int))
            .field(Field::new("authorId", "author_id", FieldType::Int))
            .field(Field::new("title", "title", FieldType::String))
    }

    fn scalar(field: &str, op: ScalarOp, value: ArgValue) -> FilterNode {
        FilterNode::Scalar {
            field: field.into(),
            op,
            value,
            insensitive: false,
        }
    }

    #[test]
    fn eq_scalar_renders_placeholder() {
        let models = vec![user_model()];
        let mut cache = SchemaFieldCache::new(&models);
        let mut params = ParamStore::new();
        let mut aliases = AliasGenerator::new();
        let node = scalar("email", ScalarOp::Eq, ArgValue::Str("a@b.com".into()));
        let result = build_where(&node, "User", "u", "where", &mut cache, &mut params, &mut aliases, &StubDialect).unwrap();
        assert_eq!(result.clause.render(Dialect::PostgreSQL), "\"u\".\"email\" = $1");
        assert!(result.joins.is_empty());
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn ne_on_nullable_field_also_matches_null() {
        let models = vec![user_model()];
        let mut cache = SchemaFieldCache::new(&models);
        let mut params = ParamStore::new();
        let mut aliases = AliasGenerator::new();
        let node = scalar("bio", ScalarOp::Ne, ArgValue::Str("x".into()));
        let result = build_where(&node, "User", "u", "where", &mut cache, &mut params, &mut aliases, &StubDialect).unwrap();
        let rendered = result.clause.render(Dialect::PostgreSQL);
        assert!(rendered.contains("<>"));
        assert!(rendered.contains("IS NULL"));
    }

    #[test]
    fn contains_templates_wildcards_around_value() {
        let models = vec![user_model()];
        let mut cache = SchemaFieldCache::new(&models);
        let mut params = ParamStore::new();
        let mut aliases = AliasGenerator::new();
        let node = scalar("email", ScalarOp::Contains, ArgValue::Str("system".into()));
        build_where(&node, "User", "u", "where", &mut cache, &mut params, &mut aliases, &StubDialect).unwrap();
        assert_eq!(params.values()[0], crate::param::ParamValue::Str("%system%".into()));
    }

    #[test]
    fn json_string_contains_extracts_path() {
        let models = vec![user_model()];
        let mut cache = SchemaFieldCache::new(&models);
        let mut params = ParamStore::new();
        let mut aliases = AliasGenerator::new();
        let node = FilterNode::Json {
            field: "meta".into(),
            op: JsonOp::StringContains,
            path: "settings.theme".into(),
            value: ArgValue::Str("dark".into()),
        };
        let result = build_where(&node, "User", "u", "where", &mut cache, &mut params, &mut aliases, &StubDialect).unwrap();
        let rendered = result.clause.render(Dialect::PostgreSQL);
        assert!(rendered.contains("settings.theme"));
        assert_eq!(params.values()[0], crate::param::ParamValue::Str("%dark%".into()));
    }

    #[test]
    fn is_not_on_to_one_relation_renders_not_exists() {
        let models = vec![user_model(), country_model()];
        let mut cache = SchemaFieldCache::new(&models);
        let mut params = ParamStore::new();
        let mut aliases = AliasGenerator::new();
        let node = FilterNode::Relation {
            field: "country".into(),
            quantifier: Quantifier::IsNot,
            nested: Box::new(scalar("id", ScalarOp::Eq, ArgValue::Int(1))),
        };
        let result = build_where(&node, "User", "u", "where", &mut cache, &mut params, &mut aliases, &StubDialect).unwrap();
        assert!(result.clause.render(Dialect::PostgreSQL).contains("NOT EXISTS"));
    }

    #[test]
    fn is_quantifier_rejects_to_many_relation() {
        let models = vec![user_model(), post_model()];
        let mut cache = SchemaFieldCache::new(&models);
        let mut params = ParamStore::new();
        let mut aliases = AliasGenerator::new();
        let node = FilterNode::Relation {
            field: "posts".into(),
            quantifier: Quantifier::Is,
            nested: Box::new(scalar("id", ScalarOp::Eq, ArgValue::Int(1))),
        };
        assert!(build_where(&node, "User", "u", "where", &mut cache, &mut params, &mut aliases, &StubDialect).is_err());
    }

    #[test]
    fn empty_none_filter_rewrites_to_left_join_is_null() {
        let models = vec![user_model(), post_model()];
        let mut cache = SchemaFieldCache::new(&models);
        let mut params = ParamStore::new();
        let mut aliases = AliasGenerator::new();
        let node = FilterNode::Relation {
            field: "posts".into(),
            quantifier: Quantifier::None,
            nested: Box::new(FilterNode::And(vec![])),
        };
        let result = build_where(&node, "User", "u", "where", &mut cache, &mut params, &mut aliases, &StubDialect).unwrap();
        assert_eq!(result.joins.len(), 1);
        assert!(result.joins[0].render(Dialect::PostgreSQL).contains("LEFT JOIN"));
        assert!(result.clause.render(Dialect::PostgreSQL).contains("IS NULL"));
    }

    #[test]
    fn nonempty_none_filter_still_uses_not_exists() {
        let models = vec![user_model(), post_model()];
        let mut cache = SchemaFieldCache::new(&models);
        let mut params = ParamStore::new();
        let mut aliases = AliasGenerator::new();
        let node = FilterNode::Relation {
            field: "posts".into(),
            quantifier: Quantifier::None,
            nested: Box::new(scalar("title", ScalarOp::Eq, ArgValue::Str("spam".into()))),
        };
        let result = build_where(&node, "User", "u", "where", &mut cache, &mut params, &mut aliases, &StubDialect).unwrap();
        assert!(result.joins.is_empty());
        assert!(result.clause.render(Dialect::PostgreSQL).contains("NOT EXISTS"));
    }

    #[test]
    fn empty_in_list_is_vacuously_false() {
        let models = vec![user_model()];
        let mut cache = SchemaFieldCache::new(&models);
        let mut params = ParamStore::new();
        let mut aliases = AliasGenerator::new();
        let node = scalar("id", ScalarOp::In, ArgValue::List(vec![]));
        let result = build_where(&node, "User", "u", "where", &mut cache, &mut params, &mut aliases, &StubDialect).unwrap();
        assert_eq!(result.clause.render(Dialect::PostgreSQL), "FALSE");
    }

    #[test]
    fn and_or_nest_with_parens() {
        let models = vec![user_model()];
        let mut cache = SchemaFieldCache::new(&models);
        let mut params = ParamStore::new();
        let mut aliases = AliasGenerator::new();
        let node = FilterNode::And(vec![
            scalar("id", ScalarOp::Gt, ArgValue::Int(1)),
            FilterNode::Or(vec![
                scalar("email", ScalarOp::Eq, ArgValue::Str("x".into())),
                FilterNode::IsNull {
                    field: "email".into(),
                    is_null: true,
                },
            ]),
        ]);
        let result = build_where(&node, "User", "u", "where", &mut cache, &mut params, &mut aliases, &StubDialect).unwrap();
        let rendered = result.clause.render(Dialect::PostgreSQL);
        assert!(rendered.contains("AND"));
        assert!(rendered.contains("OR"));
    }

    #[test]
    fn filter_depth_over_limit_errors() {
        let models = vec![user_model()];
        let mut cache = SchemaFieldCache::new(&models);
        let mut params = ParamStore::new();
        let mut aliases = AliasGenerator::new();
        let mut node = scalar("id", ScalarOp::Eq, ArgValue::Int(1));
        for _ in 0..MAX_FILTER_DEPTH + 2 {
            node = FilterNode::Not(Box::new(node));
        }
        assert!(build_where(&node, "User", "u", "where", &mut cache, &mut params, &mut aliases, &StubDialect).is_err());
    }
}
