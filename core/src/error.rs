//! Error types for the query compiler.
//!
//! Mirrors the shape of `drizzle-core::error::DrizzleError`: a flat
//! `thiserror`-derived enum with one variant per failure class, each
//! carrying a human-readable message built up by the site that detected
//! the failure.

use thiserror::Error;

/// Classification tag surfaced alongside every compiler failure (spec §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Referenced field missing, or a relation field where a scalar was required.
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// Operator not valid for the field's type or relation cardinality.
    #[error("invalid operator: {0}")]
    InvalidOperator(String),

    /// Value fails normalization (wrong shape, out of range, wrong type).
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Missing/mismatched foreign key metadata, circular include, depth exceeded.
    #[error("relation error: {0}")]
    RelationError(String),

    /// Placeholder/param length mismatch after assembly (defensive invariant).
    #[error("parameter error: {0}")]
    ParamError(String),

    /// Unsafe identifier, control character, or forbidden keyword.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Planner produced empty SQL or violated an internal invariant.
    #[error("critical compiler error: {0}")]
    Critical(String),
}

pub type Result<T> = core::result::Result<T, CompileError>;

impl CompileError {
    /// Builds a `FieldNotFound` error naming the model, the missing field,
    /// and (per spec §6) the list of fields that do exist on that model.
    pub fn field_not_found(model: &str, field: &str, available: &[&str]) -> Self {
        Self::FieldNotFound(format!(
            "model `{model}` has no field `{field}` (available: {})",
            available.join(", ")
        ))
    }

    pub fn scalar_required(model: &str, field: &str) -> Self {
        Self::FieldNotFound(format!(
            "`{field}` on model `{model}` is a relation; a scalar field was required here"
        ))
    }

    pub fn with_path(self, path: &str) -> Self {
        if path.is_empty() {
            return self;
        }
        match self {
            Self::FieldNotFound(m) => Self::FieldNotFound(format!("{path}: {m}")),
            Self::InvalidOperator(m) => Self::InvalidOperator(format!("{path}: {m}")),
            Self::InvalidValue(m) => Self::InvalidValue(format!("{path}: {m}")),
            Self::RelationError(m) => Self::RelationError(format!("{path}: {m}")),
            Self::ParamError(m) => Self::ParamError(format!("{path}: {m}")),
            Self::ValidationError(m) => Self::ValidationError(format!("{path}: {m}")),
            Self::Critical(m) => Self::Critical(format!("{path}: {m}")),
        }
    }
}
