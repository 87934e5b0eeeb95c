//! Named resource-limit constants (spec §5 "Concurrency & Resource Model").
//!
//! Kept as a single module, the way `drizzle-core` centralizes its
//! placeholder-style and column-count constants, so every component
//! enforces the same numbers instead of each hand-rolling its own cap.

/// Maximum nesting depth of a filter tree (`$and`/`$or`/`$not` chains and
/// relation-filter nesting combined).
pub const MAX_FILTER_DEPTH: usize = 10;

/// Maximum number of `include`/`select` relation entries in a single query.
pub const MAX_INCLUDES: usize = 50;

/// Maximum number of correlated subqueries or lateral joins the planner
/// may emit for one top-level compile.
pub const MAX_SUBQUERIES: usize = 100;

/// Maximum number of distinct aliases the [`crate::alias::AliasGenerator`]
/// will hand out before refusing further allocation.
pub const MAX_ALIASES: usize = 10_000;

/// Maximum depth of the query tree overall (models reachable via nested
/// includes), independent of filter depth.
pub const MAX_QUERY_TREE_DEPTH: usize = 50;

/// Maximum element count accepted for an array-valued literal.
pub const MAX_ARRAY_LITERAL_LEN: usize = 10_000;

/// Maximum byte length accepted for a string literal value.
pub const MAX_STRING_LITERAL_LEN: usize = 10_000;

/// Maximum byte length for any single identifier (PostgreSQL's own
/// `NAMEDATALEN` limit, which this compiler also enforces for SQLite for
/// cross-dialect alias stability).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Hard ceiling on estimated row fanout across a compiled query's joins;
/// the planner refuses to emit a plan estimated to exceed this.
pub const HARD_FANOUT_CAP: u64 = 5_000;
