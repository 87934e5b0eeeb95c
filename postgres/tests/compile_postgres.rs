//! End-to-end compile scenarios against the PostgreSQL dialect.

use nestquery_core::args::{Method, QueryArgs};
use nestquery_core::filter::{FilterNode, Quantifier, ScalarOp};
use nestquery_core::include::IncludeSpec;
use nestquery_core::order::{Direction, Pagination, SortKey};
use nestquery_core::param::{ArgValue, ParamValue};
use nestquery_core::schema::{Cardinality, Field, FieldType, Model};
use nestquery_core::compile;
use nestquery_postgres::PostgresDialect;

fn user_model() -> Model {
    Model::new("User", "users")
        .field(Field::new("id", "id", FieldType::Int))
        .field(Field::new("email", "email", FieldType::String))
        .field(Field::new("country", "country", FieldType::String))
        .field(Field::new("kickId", "kick_id", FieldType::String).optional())
        .field(Field::new("permissions", "permissions", FieldType::String).list())
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
        .field(Field::new(
            "comments",
            "comments",
            FieldType::Relation {
                target_model: "Comment".into(),
                foreign_key: "author_id".into(),
                references: "id".into(),
                cardinality: Cardinality::Many,
                is_foreign_key_local: false,
            },
        ))
        .primary_key(vec!["id".into()])
}

fn post_model() -> Model {
    Model::new("Post", "posts")
        .field(Field::new("id", "id", FieldType::Int))
        .field(Field::new("authorId", "author_id", FieldType::Int))
        .field(Field::new("title", "title", FieldType::String))
        .field(Field::new("createdAt", "created_at", FieldType::DateTime))
        .primary_key(vec!["id".into()])
}

fn comment_model() -> Model {
    Model::new("Comment", "comments")
        .field(Field::new("id", "id", FieldType::Int))
        .field(Field::new("authorId", "author_id", FieldType::Int))
        .field(Field::new("body", "body", FieldType::String))
        .primary_key(vec!["id".into()])
}

fn schema() -> Vec<Model> {
    vec![user_model(), post_model(), comment_model()]
}

#[test]
fn find_first_with_scalar_and_array_filters() {
    let models = schema();
    let mut args = QueryArgs::new();
    args.filter = Some(FilterNode::And(vec![
        FilterNode::Scalar {
            field: "kickId".into(),
            op: ScalarOp::Eq,
            value: ArgValue::Str("kick-123".into()),
        },
        FilterNode::Scalar {
            field: "country".into(),
            op: ScalarOp::Eq,
            value: ArgValue::Str("US".into()),
        },
        FilterNode::Array {
            field: "permissions".into(),
            op: nestquery_core::filter::ArrayOp::Has,
            value: ArgValue::Str("admin".into()),
        },
        FilterNode::Scalar {
            field: "email".into(),
            op: ScalarOp::ILike,
            value: ArgValue::Str("%@example.com".into()),
        },
    ]));

    let compiled = compile(&models, "User", Method::FindFirst, &args, &PostgresDialect).unwrap();
    assert!(compiled.sql.contains("SELECT"));
    assert!(compiled.sql.contains("\"kick_id\" = $1"));
    assert!(compiled.sql.contains("@> ARRAY[$3]"));
    assert!(compiled.sql.contains("ILIKE"));
    assert!(compiled.sql.contains("LIMIT 1"));
    assert_eq!(compiled.params.len(), 4);
}

#[test]
fn find_many_posts_with_cursor_and_order() {
    let models = schema();
    let mut args = QueryArgs::new();
    args.order_by = vec![SortKey::new("createdAt", Direction::Desc)];
    args.pagination = Pagination {
        take: Some(20),
        skip: None,
        cursor: Some(vec![("id".into(), ParamValue::Int(42))]),
    };

    let compiled = compile(&models, "Post", Method::FindMany, &args, &PostgresDialect).unwrap();
    assert!(compiled.sql.starts_with("WITH __tp_cursor"), "{}", compiled.sql);
    assert!(compiled.sql.contains("EXISTS (SELECT 1 FROM __tp_cursor"));
    assert!(compiled.sql.contains("ORDER BY"));
    assert!(compiled.sql.contains("LIMIT 20"));
    assert_eq!(compiled.params.len(), 1);
}

#[test]
fn find_many_with_none_and_empty_nested_filter_uses_left_join_not_exists() {
    let models = schema();
    let mut args = QueryArgs::new();
    args.filter = Some(FilterNode::Relation {
        field: "posts".into(),
        quantifier: Quantifier::None,
        nested: Box::new(FilterNode::And(Vec::new())),
    });

    let compiled = compile(&models, "User", Method::FindMany, &args, &PostgresDialect).unwrap();
    assert!(!compiled.sql.contains("NOT EXISTS"), "{}", compiled.sql);
    assert!(compiled.sql.contains("LEFT JOIN"), "{}", compiled.sql);
    assert!(compiled.sql.contains("IS NULL"), "{}", compiled.sql);
}

#[test]
fn find_many_with_two_unpaginated_list_includes_decomposes() {
    let models = schema();
    let mut args = QueryArgs::new();
    args.includes = vec![
        IncludeSpec::new("posts", QueryArgs::new()),
        IncludeSpec::new("comments", QueryArgs::new()),
    ];

    let compiled = compile(&models, "User", Method::FindMany, &args, &PostgresDialect).unwrap();
    assert!(compiled.sql.contains("json_agg"), "first include stays inline: {}", compiled.sql);
    assert_eq!(compiled.batch.len(), 1);
    assert_eq!(compiled.batch[0].relation_field, "comments");
    assert!(compiled.batch[0].sql.contains("= ANY("));
    assert!(compiled.requires_reduction);
}

#[test]
fn find_many_with_take_and_single_include_flat_joins_and_reports_include_spec() {
    let models = schema();
    let mut args = QueryArgs::new();
    args.pagination.take = Some(10);
    args.includes = vec![IncludeSpec::new("posts", QueryArgs::new())];

    let compiled = compile(&models, "User", Method::FindMany, &args, &PostgresDialect).unwrap();
    assert!(compiled.sql.contains("LEFT JOIN"), "{}", compiled.sql);
    assert!(compiled.sql.contains("\"posts.id\""), "{}", compiled.sql);
    assert!(compiled.requires_reduction);
    assert_eq!(compiled.include_spec.len(), 1);
    assert_eq!(compiled.include_spec[0].alias, "posts");
    assert_eq!(compiled.include_spec[0].primary_key_columns, vec!["id".to_string()]);
}

#[test]
fn find_many_with_none_quantifier_uses_not_exists() {
    let models = schema();
    let mut args = QueryArgs::new();
    args.filter = Some(FilterNode::Relation {
        field: "posts".into(),
        quantifier: Quantifier::None,
        nested: Box::new(FilterNode::Scalar {
            field: "title".into(),
            op: ScalarOp::Eq,
            value: ArgValue::Str("spam".into()),
        }),
    });

    let compiled = compile(&models, "User", Method::FindMany, &args, &PostgresDialect).unwrap();
    assert!(compiled.sql.contains("NOT EXISTS"));
}
