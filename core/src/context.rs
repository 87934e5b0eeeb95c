//! Build context (spec §3 `BuildContext`).
//!
//! Bundles the mutable state threaded through a single compile — the
//! schema cache, parameter store, alias generator, and the active
//! dialect adapter — plus a nesting-depth counter the include/select
//! builder (C7) and planner (C9) use to enforce the query-tree depth
//! cap. Lower-level builders (filter, order) take their dependencies as
//! plain arguments since they're called from tight loops inside a single
//! WHERE clause; `BuildContext` exists for the coarser-grained callers
//! (C7 and above) that pass the whole bundle down through recursive
//! include expansion.

use crate::alias::AliasGenerator;
use crate::cache::SchemaFieldCache;
use crate::dialect::DialectAdapter;
use crate::error::CompileError;
use crate::limits::MAX_QUERY_TREE_DEPTH;
use crate::param::ParamStore;

pub struct BuildContext<'a> {
    pub cache: SchemaFieldCache<'a>,
    pub params: ParamStore,
    pub aliases: AliasGenerator,
    pub dialect: &'a dyn DialectAdapter,
    depth: usize,
}

impl<'a> BuildContext<'a> {
    pub fn new(cache: SchemaFieldCache<'a>, dialect: &'a dyn DialectAdapter) -> Self {
        Self {
            cache,
            params: ParamStore::new(),
            aliases: AliasGenerator::new(),
            dialect,
            depth: 0,
        }
    }

    /// Runs `f` with the depth counter incremented by one, failing if
    /// that would exceed [`MAX_QUERY_TREE_DEPTH`]. Used when recursing
    /// into a nested `include`.
    pub fn with_deeper<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, CompileError>) -> Result<T, CompileError> {
        self.depth += 1;
        if self.depth > MAX_QUERY_TREE_DEPTH {
            self.depth -= 1;
            return Err(CompileError::Critical(format!(
                "query tree exceeds max depth of {MAX_QUERY_TREE_DEPTH}"
            )));
        }
        let result = f(self);
        self.depth -= 1;
        result
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}
