//! Client-side query execution layer for clustered CQL databases.
//!
//! `corvid` sits in front of a driver [`Session`](session::Session): it turns raw text,
//! structured queries, or prepared handles into executable statements, resolves
//! per-call options against ambient defaults, dispatches synchronously or
//! asynchronously, and decodes result sets into [`Record`]s.
//!
//! ```no_run
//! use std::sync::Arc;
//! use corvid::{context, exec, query, Consistency, ExecuteOptions};
//! use corvid::session::memory::MemorySession;
//!
//! # fn main() -> corvid::Result<()> {
//! let session = Arc::new(MemorySession::new());
//! context::set_session(session);
//!
//! let rows = context::with_consistency(Consistency::Quorum, || {
//!     exec::execute(
//!         query::select("users").where_eq("id", 42),
//!         ExecuteOptions::new(),
//!     )
//! })?;
//! println!("{} rows", rows.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod exec;
pub mod logging;
pub mod query;
pub mod session;

pub use codec::{Record, Uuid, Value, WireValue};
pub use context::Context;
pub use error::{DriverError, DriverErrorKind, Error, Result};
pub use exec::{AsyncResult, ExecuteOptions};
pub use query::{Consistency, QueryInput, StructuredQuery};
