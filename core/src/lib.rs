//! Nested query compiler core.
//!
//! Translates an object-shaped query description (filter tree, ordering,
//! pagination, nested includes) against a runtime [`schema::Model`] set
//! into parameterized SQL for one of the dialects implemented in
//! `nestquery-postgres`/`nestquery-sqlite`, plus a [`reducer::Reducer`]
//! that folds the driver's flat rows back into the nested object shape
//! the caller asked for.
//!
//! Module layout follows the compiler's own pipeline, front to back:
//! sanitizing identifiers and literals (`ident`), accumulating bound
//! parameters (`param`), describing the schema (`schema`, `cache`),
//! building fragments (`filter`, `order`, `include`), then planning and
//! assembling the final statement (`planner`, `assembly`), and finally
//! reducing results (`reducer`).

pub mod alias;
pub mod args;
pub mod assembly;
pub mod cache;
pub mod compile;
pub mod context;
pub mod dialect;
pub mod error;
pub mod filter;
pub mod ident;
pub mod include;
pub mod limits;
pub mod order;
pub mod param;
pub mod planner;
pub mod reducer;
pub mod schema;
pub mod sql;

pub use args::{Method, QueryArgs};
pub use compile::{compile, BatchQuery, CompiledQuery};
pub use dialect::{Dialect, DialectAdapter};
pub use error::{CompileError, Result};
pub use reducer::{IncludeTreeMeta, ReductionSpec, Reducer, Row};
pub use schema::{Cardinality, Field, FieldType, Model};
