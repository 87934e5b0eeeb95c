//! Query arguments (spec §3 `QueryArgs`).
//!
//! The caller-facing description of one query: which model, which
//! method, and the filter/order/pagination/include/select knobs that
//! shape the compiled statement.

use compact_str::CompactString;

use crate::filter::FilterNode;
use crate::include::IncludeSpec;
use crate::order::{Pagination, SortKey};

/// The CRUD-read method being compiled. Mirrors the ORM-style method
/// names the spec's external interface uses (`findFirst`/`findMany`/...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    FindFirst,
    FindMany,
    FindUnique,
    Count,
}

impl Method {
    /// Whether this method caps the result set to a single row
    /// regardless of caller-supplied pagination.
    pub fn is_singular(&self) -> bool {
        matches!(self, Method::FindFirst | Method::FindUnique)
    }
}

/// A fully-parsed query request for one model.
#[derive(Debug, Clone, Default)]
pub struct QueryArgs {
    pub filter: Option<FilterNode>,
    pub order_by: Vec<SortKey>,
    pub pagination: Pagination,
    pub includes: Vec<IncludeSpec>,
    /// Explicit scalar field projection; `None` means "all scalar
    /// fields" (the default ORM-style behavior).
    pub select: Option<Vec<CompactString>>,
    /// Distinct-by field list; empty means no deduplication.
    pub distinct: Vec<CompactString>,
}

impl QueryArgs {
    pub fn new() -> Self {
        Self::default()
    }
}
