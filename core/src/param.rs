//! Parameter values and the parameter store (spec §4.2, component C2).
//!
//! `ArgValue` is the literal tree callers build query arguments out of;
//! `ParamValue` is what actually gets bound to the driver once normalized.
//! The split mirrors the teacher's `Param<'a, V>` (caller-facing) vs.
//! `OwnedParam<V>` (owned, bind-ready) distinction in
//! `drizzle-core::params`, generalized from a single generic `V` to a
//! fixed enum since the schema here is a runtime value rather than a
//! type parameter.

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::error::CompileError;
use crate::limits::{MAX_ARRAY_LITERAL_LEN, MAX_STRING_LITERAL_LEN};

/// A literal value as supplied by the caller in query arguments, before
/// normalization against a field's declared type.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ArgValue>),
    /// A named placeholder resolved later against an external binding
    /// table rather than embedded at compile time (spec's "Dynamic"
    /// marker, used for values only known at execution time such as
    /// `$session.userId`).
    Dynamic(String),
}

impl ArgValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ArgValue::Null => "null",
            ArgValue::Bool(_) => "bool",
            ArgValue::Int(_) => "int",
            ArgValue::Float(_) => "float",
            ArgValue::Str(_) => "string",
            ArgValue::List(_) => "list",
            ArgValue::Dynamic(_) => "dynamic",
        }
    }
}

/// A normalized, bind-ready parameter value. Distinct from `ArgValue` in
/// that it has already been validated against a field's declared type
/// and size limits, and `Dynamic` markers have either been resolved or
/// rejected.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(CompactString),
    /// A homogeneous array literal, bound as a native array parameter on
    /// PostgreSQL or serialized to JSON text on SQLite by the dialect
    /// adapter at bind time.
    Array(Vec<ParamValue>),
}

/// Normalizes a caller-supplied literal into a bindable parameter,
/// enforcing the array/string length caps from spec §5.
pub fn normalize_arg(value: &ArgValue) -> Result<ParamValue, CompileError> {
    match value {
        ArgValue::Null => Ok(ParamValue::Null),
        ArgValue::Bool(b) => Ok(ParamValue::Bool(*b)),
        ArgValue::Int(i) => Ok(ParamValue::Int(*i)),
        ArgValue::Float(f) => Ok(ParamValue::Float(*f)),
        ArgValue::Str(s) => {
            if s.len() > MAX_STRING_LITERAL_LEN {
                return Err(CompileError::InvalidValue(format!(
                    "string literal exceeds {MAX_STRING_LITERAL_LEN} bytes"
                )));
            }
            Ok(ParamValue::Str(CompactString::from(s.as_str())))
        }
        ArgValue::List(items) => {
            if items.len() > MAX_ARRAY_LITERAL_LEN {
                return Err(CompileError::InvalidValue(format!(
                    "array literal exceeds {MAX_ARRAY_LITERAL_LEN} elements"
                )));
            }
            let normalized = items.iter().map(normalize_arg).collect::<Result<Vec<_>, _>>()?;
            Ok(ParamValue::Array(normalized))
        }
        ArgValue::Dynamic(name) => Err(CompileError::InvalidValue(format!(
            "dynamic parameter `{name}` was not resolved before compilation"
        ))),
    }
}

/// Provenance record for one bound parameter: which scope of the query
/// tree it was produced in, so a caller inspecting a `CompiledQuery` can
/// map a placeholder back to the filter/include/order-by site that
/// introduced it (spec §3 `ParamStore.addAutoScoped`, §4.2).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParamMapping {
    /// 0-based index into the parallel value array.
    pub index: usize,
    /// Dotted path identifying where in the query tree this value was
    /// bound, e.g. `"where.and.1.title"` or `"include.posts.orderBy.id"`.
    pub scope_path: String,
}

/// Accumulates parameters in appearance order and hands out positional
/// indices, the way `drizzle-core`'s binder accumulates `OwnedParam`s
/// before a statement is finalized. Index 0 corresponds to placeholder
/// `$1`/the first `?`.
///
/// Alongside the values themselves, the store keeps a parallel
/// `mappings` vector recording which scope of the query tree produced
/// each value, so the compiled query can report, for any placeholder,
/// where it came from.
#[derive(Debug, Default)]
pub struct ParamStore {
    values: SmallVec<[ParamValue; 8]>,
    mappings: Vec<ParamMapping>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` and returns its 0-based index for use with
    /// [`crate::sql::Sql::placeholder`]. Does not record a scope mapping;
    /// prefer [`ParamStore::add_auto_scoped`] wherever a scope path is
    /// available.
    pub fn add(&mut self, value: ParamValue) -> usize {
        self.values.push(value);
        self.values.len() - 1
    }

    /// Normalizes and appends a caller-supplied literal in one step.
    pub fn add_arg(&mut self, value: &ArgValue) -> Result<usize, CompileError> {
        Ok(self.add(normalize_arg(value)?))
    }

    /// Appends `value` under `scope`, recording a [`ParamMapping`] for it.
    /// Unlike [`ParamStore::add_arg`], this accepts [`ArgValue::Dynamic`]
    /// markers: a scoped binding site is exactly where an external caller
    /// would resolve a dynamic placeholder before it reaches the store, so
    /// rejecting it here would be premature. Any other normalization
    /// failure (oversized literal, etc.) still propagates.
    pub fn add_auto_scoped(&mut self, value: &ArgValue, scope: impl Into<String>) -> Result<usize, CompileError> {
        let normalized = match value {
            ArgValue::Dynamic(name) => ParamValue::Str(CompactString::from(name.as_str())),
            other => normalize_arg(other)?,
        };
        let index = self.add(normalized);
        self.mappings.push(ParamMapping {
            index,
            scope_path: scope.into(),
        });
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consumes the store, returning the parameters in bind order.
    pub fn into_values(self) -> Vec<ParamValue> {
        self.values.into_vec()
    }

    pub fn values(&self) -> &[ParamValue] {
        &self.values
    }

    /// Consumes the store, returning its immutable final snapshot: the
    /// bind-ordered values plus their scope mappings (spec §3
    /// `ParamStore.snapshot()`).
    pub fn snapshot(self) -> (Vec<ParamValue>, Vec<ParamMapping>) {
        (self.values.into_vec(), self.mappings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rejects_oversized_string() {
        let huge = "x".repeat(MAX_STRING_LITERAL_LEN + 1);
        assert!(normalize_arg(&ArgValue::Str(huge)).is_err());
    }

    #[test]
    fn normalize_rejects_oversized_array() {
        let huge: Vec<ArgValue> = (0..MAX_ARRAY_LITERAL_LEN + 1).map(ArgValue::Int).collect();
        assert!(normalize_arg(&ArgValue::List(huge)).is_err());
    }

    #[test]
    fn normalize_rejects_unresolved_dynamic() {
        assert!(normalize_arg(&ArgValue::Dynamic("session.userId".into())).is_err());
    }

    #[test]
    fn store_assigns_sequential_indices() {
        let mut store = ParamStore::new();
        let i0 = store.add(ParamValue::Int(1));
        let i1 = store.add(ParamValue::Int(2));
        assert_eq!((i0, i1), (0, 1));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn auto_scoped_records_mapping() {
        let mut store = ParamStore::new();
        let idx = store.add_auto_scoped(&ArgValue::Str("x".into()), "where.title").unwrap();
        let (values, mappings) = store.snapshot();
        assert_eq!(values[idx], ParamValue::Str("x".into()));
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].index, idx);
        assert_eq!(mappings[0].scope_path, "where.title");
    }

    #[test]
    fn auto_scoped_accepts_dynamic_value() {
        let mut store = ParamStore::new();
        let idx = store.add_auto_scoped(&ArgValue::Dynamic("session.userId".into()), "where.authorId").unwrap();
        let (values, _) = store.snapshot();
        assert_eq!(values[idx], ParamValue::Str("session.userId".into()));
    }

    #[test]
    fn snapshot_preserves_bind_order() {
        let mut store = ParamStore::new();
        store.add_arg(&ArgValue::Int(1)).unwrap();
        store.add_auto_scoped(&ArgValue::Int(2), "x").unwrap();
        let (values, mappings) = store.snapshot();
        assert_eq!(values, vec![ParamValue::Int(1), ParamValue::Int(2)]);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].index, 1);
    }
}
