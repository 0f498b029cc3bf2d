//! Resolution of query inputs into executable statements.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::codec::{Codec, Value, WireValue};
use crate::error::Result;
use crate::query::ast::StructuredQuery;
use crate::query::cache::QueryCache;
use crate::query::consistency::{Consistency, BASELINE_CONSISTENCY};
use crate::session::{PreparedHandle, RetryPolicy};

/// The accepted surface forms of a query.
#[derive(Clone)]
pub enum QueryInput {
    /// Query text submitted as a simple statement.
    Raw(Arc<str>),
    /// Structured description compiled through the query cache.
    Structured(StructuredQuery),
    /// Server-side prepared statement.
    Prepared(PreparedHandle),
}

impl fmt::Debug for QueryInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryInput::Raw(text) => f.debug_tuple("Raw").field(text).finish(),
            QueryInput::Structured(query) => f.debug_tuple("Structured").field(query).finish(),
            QueryInput::Prepared(handle) => {
                f.debug_tuple("Prepared").field(&handle.query()).finish()
            }
        }
    }
}

impl From<&str> for QueryInput {
    fn from(value: &str) -> Self {
        QueryInput::Raw(value.into())
    }
}

impl From<String> for QueryInput {
    fn from(value: String) -> Self {
        QueryInput::Raw(value.into())
    }
}

impl From<Arc<str>> for QueryInput {
    fn from(value: Arc<str>) -> Self {
        QueryInput::Raw(value)
    }
}

impl From<StructuredQuery> for QueryInput {
    fn from(value: StructuredQuery) -> Self {
        QueryInput::Structured(value)
    }
}

impl From<crate::query::ast::Select> for QueryInput {
    fn from(value: crate::query::ast::Select) -> Self {
        QueryInput::Structured(value.into())
    }
}

impl From<crate::query::ast::Insert> for QueryInput {
    fn from(value: crate::query::ast::Insert) -> Self {
        QueryInput::Structured(value.into())
    }
}

impl From<crate::query::ast::Update> for QueryInput {
    fn from(value: crate::query::ast::Update) -> Self {
        QueryInput::Structured(value.into())
    }
}

impl From<crate::query::ast::Delete> for QueryInput {
    fn from(value: crate::query::ast::Delete) -> Self {
        QueryInput::Structured(value.into())
    }
}

impl From<PreparedHandle> for QueryInput {
    fn from(value: PreparedHandle) -> Self {
        QueryInput::Prepared(value)
    }
}

impl From<&PreparedHandle> for QueryInput {
    fn from(value: &PreparedHandle) -> Self {
        QueryInput::Prepared(value.clone())
    }
}

/// Base statement before per-call options are applied.
#[derive(Clone)]
pub enum Statement {
    /// Query text.
    Simple {
        /// Text sent to the server.
        text: Arc<str>,
    },
    /// Prepared statement with positional values.
    Bound {
        /// The prepared handle.
        prepared: PreparedHandle,
        /// Encoded values in bind order.
        values: Vec<WireValue>,
    },
}

impl Statement {
    /// Query text, for either kind.
    pub fn text(&self) -> &str {
        match self {
            Statement::Simple { text } => text,
            Statement::Bound { prepared, .. } => prepared.query(),
        }
    }

    /// Bound values; empty for simple statements.
    pub fn values(&self) -> &[WireValue] {
        match self {
            Statement::Simple { .. } => &[],
            Statement::Bound { values, .. } => values,
        }
    }

    /// `true` for [`Statement::Simple`].
    pub fn is_simple(&self) -> bool {
        matches!(self, Statement::Simple { .. })
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Simple { text } => f.debug_struct("Simple").field("text", text).finish(),
            Statement::Bound { prepared, values } => f
                .debug_struct("Bound")
                .field("query", &prepared.query())
                .field("values", values)
                .finish(),
        }
    }
}

/// Per-call statement annotations.
#[derive(Clone, Debug, Default)]
pub struct StatementOptions {
    /// Explicit consistency; falls back to the ambient level.
    pub consistency: Option<Consistency>,
    /// Serial consistency for conditional updates.
    pub serial_consistency: Option<Consistency>,
    /// Routing key override. Only meaningful for simple statements; the session
    /// reports misuse on other kinds.
    pub routing_key: Option<Bytes>,
    /// Retry policy passed through to the session.
    pub retry_policy: Option<Arc<dyn RetryPolicy>>,
    /// Requests server-side tracing.
    pub tracing: bool,
    /// Page size hint.
    pub fetch_size: Option<i32>,
    /// Client-side write timestamp in microseconds.
    pub timestamp: Option<i64>,
}

/// A statement ready for submission.
///
/// A consistency level is always present: explicit, else ambient, else
/// [`BASELINE_CONSISTENCY`].
#[derive(Clone, Debug)]
pub struct ExecutableStatement {
    statement: Statement,
    consistency: Consistency,
    serial_consistency: Option<Consistency>,
    routing_key: Option<Bytes>,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    tracing: bool,
    fetch_size: Option<i32>,
    timestamp: Option<i64>,
}

impl ExecutableStatement {
    /// Underlying statement.
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Resolved consistency level.
    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    /// Serial consistency, if requested.
    pub fn serial_consistency(&self) -> Option<Consistency> {
        self.serial_consistency
    }

    /// Routing key, if provided.
    pub fn routing_key(&self) -> Option<&Bytes> {
        self.routing_key.as_ref()
    }

    /// Retry policy, if provided.
    pub fn retry_policy(&self) -> Option<&Arc<dyn RetryPolicy>> {
        self.retry_policy.as_ref()
    }

    /// Whether tracing was requested.
    pub fn tracing(&self) -> bool {
        self.tracing
    }

    /// Page size hint.
    pub fn fetch_size(&self) -> Option<i32> {
        self.fetch_size
    }

    /// Client-side timestamp.
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }
}

/// Binds native values to a prepared handle.
///
/// Values are encoded in order; the prepared statement validates the count.
pub fn bind(prepared: &PreparedHandle, values: &[Value], codec: &Codec) -> Result<Statement> {
    let values = codec.encode_values(values)?;
    prepared.validate_bind(&values)?;
    Ok(Statement::Bound {
        prepared: prepared.clone(),
        values,
    })
}

/// Converts any query form into a base statement.
///
/// Bind values only apply to prepared input; they are ignored for raw and structured
/// queries.
pub fn to_statement(
    input: &QueryInput,
    values: Option<&[Value]>,
    cache: &dyn QueryCache,
    codec: &Codec,
) -> Result<Statement> {
    match input {
        QueryInput::Raw(text) => {
            if values.is_some_and(|v| !v.is_empty()) {
                debug!("ignoring bind values for a simple statement");
            }
            Ok(Statement::Simple { text: text.clone() })
        }
        QueryInput::Structured(query) => {
            let text = cache.resolve_raw(query)?;
            to_statement(&QueryInput::Raw(text), values, cache, codec)
        }
        QueryInput::Prepared(prepared) => bind(prepared, values.unwrap_or_default(), codec),
    }
}

/// Annotates `statement` with per-call options and the resolved consistency.
pub fn apply_options(
    statement: Statement,
    options: &StatementOptions,
    ambient_consistency: Option<Consistency>,
) -> ExecutableStatement {
    ExecutableStatement {
        statement,
        consistency: resolve_consistency(options.consistency, ambient_consistency),
        serial_consistency: options.serial_consistency,
        routing_key: options.routing_key.clone(),
        retry_policy: options.retry_policy.clone(),
        tracing: options.tracing,
        fetch_size: options.fetch_size,
        timestamp: options.timestamp,
    }
}

/// Explicit level, else ambient, else [`BASELINE_CONSISTENCY`].
pub fn resolve_consistency(
    explicit: Option<Consistency>,
    ambient: Option<Consistency>,
) -> Consistency {
    explicit.or(ambient).unwrap_or(BASELINE_CONSISTENCY)
}
