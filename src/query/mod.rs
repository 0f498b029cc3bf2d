#![forbid(unsafe_code)]

//! Query representations and their resolution into executable statements.
//!
//! A query arrives as raw text, a [`StructuredQuery`], or a prepared handle
//! ([`QueryInput`]). Structured queries are compiled to text through a [`QueryCache`];
//! prepared handles are bound with encoded values. The result is then annotated with
//! per-call options to give an [`ExecutableStatement`].

/// Structured query descriptions.
///
/// Value types with structural equality, usable as cache keys.
pub mod ast;

/// Fluent constructors for structured queries.
pub mod builder;

/// Compiler cache strategies.
///
/// Memoizes structured query compilation behind a swappable [`QueryCache`].
pub mod cache;

/// Consistency levels and the baseline default.
pub mod consistency;

/// Default CQL renderer for structured queries.
pub mod cql;

/// Statement resolution and option application.
pub mod statement;

pub use ast::{Operator, StructuredQuery, Term};
pub use builder::{delete_from, insert_into, placeholder, select, update};
pub use cache::{CacheStats, CompileFn, LruQueryCache, QueryCache, UncachedQueries};
pub use consistency::{Consistency, BASELINE_CONSISTENCY};
pub use statement::{
    apply_options, bind, resolve_consistency, to_statement, ExecutableStatement, QueryInput,
    Statement, StatementOptions,
};
