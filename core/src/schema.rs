//! External schema types (spec §3 `Model`/`Field`).
//!
//! These are the caller-supplied description of the data model the
//! compiler translates queries against. Unlike `drizzle-core`, where a
//! table's columns are encoded as Rust types and checked by the
//! compiler, here the schema is ordinary runtime data handed to
//! [`crate::compile::compile`] alongside the query arguments.

use compact_str::CompactString;

/// A scalar or relation field on a [`Model`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: CompactString,
    pub column: CompactString,
    pub field_type: FieldType,
    /// `true` if this column itself holds an array value (Postgres native
    /// array columns; emulated via JSON text on SQLite).
    pub is_list: bool,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<CompactString>, column: impl Into<CompactString>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            field_type,
            is_list: false,
            nullable: false,
        }
    }

    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.field_type, FieldType::Relation { .. })
    }
}

/// The declared type of a field: either a scalar SQL type or a relation
/// to another model.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Int,
    Float,
    Decimal,
    Bool,
    BigInt,
    DateTime,
    Json,
    /// A named enum scalar (spec §3's `<EnumName>` type). The name is
    /// carried only for error messages; the compiler treats enum values
    /// as opaque strings bound through the parameter store like any
    /// other scalar.
    Enum(CompactString),
    Relation {
        /// Name of the related model, resolved against the same
        /// `Model` set passed to `compile`.
        target_model: CompactString,
        /// Column on `self` referencing `target_model`'s key, or vice
        /// versa, depending on `cardinality`.
        foreign_key: CompactString,
        /// Column on the referenced side that `foreign_key` points at.
        references: CompactString,
        cardinality: Cardinality,
        /// `true` when `self` owns the physical `foreign_key` column
        /// (the "many" side of a one-to-many, or the owning side of a
        /// one-to-one); `false` when the foreign key column lives on
        /// the related table instead, so join predicates and local
        /// null-checks need to flip direction.
        is_foreign_key_local: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// A queryable model (table), with its fields in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub name: CompactString,
    pub table: CompactString,
    pub fields: Vec<Field>,
    /// Column(s) identifying a row uniquely; used for default ordering
    /// tie-breaks and cursor pagination.
    pub primary_key: Vec<CompactString>,
}

impl Model {
    pub fn new(name: impl Into<CompactString>, table: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn primary_key(mut self, columns: impl IntoIterator<Item = CompactString>) -> Self {
        self.primary_key = columns.into_iter().collect();
        self
    }

    pub fn find_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}
