#![forbid(unsafe_code)]

//! Synchronous and asynchronous execution.
//!
//! Every entry point resolves the session (per call, else context), turns the query into
//! an [`ExecutableStatement`], and hands it to the session. The blocking path returns
//! decoded records. The async path returns an [`AsyncResult`] as soon as the request is
//! submitted; the completion bridge later writes exactly one outcome into it and then
//! runs the matching callback on the chosen [`Executor`].
//!
//! Failures that happen before submission (no session, encoding, compilation, bind
//! arity) are returned directly by both paths and never reach a callback.

mod bridge;
pub mod executor;
mod slot;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::codec::{decode_result_set, Record, Value};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::query::consistency::Consistency;
use crate::query::statement::{
    apply_options, to_statement, ExecutableStatement, QueryInput, StatementOptions,
};
use crate::session::{PreparedHandle, RetryPolicy, Session};

use self::bridge::Completion;

pub use self::bridge::{ErrorCallback, SuccessCallback};
pub use self::executor::{
    shared_pool, Executor, InlineExecutor, Task, ThreadExecutor, TokioExecutor,
};
pub use self::slot::{AsyncResult, Outcome};
pub use crate::session::{cluster, connect, shutdown_cluster, shutdown_session};

/// Per-call overrides for one execution.
///
/// Anything left unset falls back to the [`Context`]. Callbacks only apply to
/// [`execute_async`].
#[derive(Default)]
pub struct ExecuteOptions {
    session: Option<Arc<dyn Session>>,
    statement: StatementOptions,
    keywordize: Option<bool>,
    values: Option<Vec<Value>>,
    executor: Option<Arc<dyn Executor>>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl ExecuteOptions {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs on `session` instead of the context's.
    pub fn session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    /// Consistency level for this call.
    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.statement.consistency = Some(consistency);
        self
    }

    /// Serial consistency for conditional updates.
    ///
    /// Only `Serial` and `LocalSerial` are accepted; other levels fail the call with
    /// [`Error::Invalid`] before anything reaches the session.
    pub fn serial_consistency(mut self, consistency: Consistency) -> Self {
        self.statement.serial_consistency = Some(consistency);
        self
    }

    /// Routing key override.
    pub fn routing_key(mut self, key: impl Into<Bytes>) -> Self {
        self.statement.routing_key = Some(key.into());
        self
    }

    /// Retry policy handed to the session.
    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.statement.retry_policy = Some(policy);
        self
    }

    /// Requests server-side tracing.
    pub fn tracing(mut self, enabled: bool) -> Self {
        self.statement.tracing = enabled;
        self
    }

    /// Whether to convert column names to canonical keys.
    pub fn keywordize(mut self, keywordize: bool) -> Self {
        self.keywordize = Some(keywordize);
        self
    }

    /// Positional bind values for a prepared query.
    pub fn values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Page size hint.
    pub fn fetch_size(mut self, fetch_size: i32) -> Self {
        self.statement.fetch_size = Some(fetch_size);
        self
    }

    /// Client-side write timestamp in microseconds.
    pub fn timestamp(mut self, micros: i64) -> Self {
        self.statement.timestamp = Some(micros);
        self
    }

    /// Runs async completions on `executor`.
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Called with the records after an async execution succeeds.
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Vec<Record>) + Send + 'static,
    {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Called with the failure after an async execution fails.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Error) + Send + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Copy of every override except the callbacks.
    fn without_callbacks(&self) -> Self {
        Self {
            session: self.session.clone(),
            statement: self.statement.clone(),
            keywordize: self.keywordize,
            values: self.values.clone(),
            executor: self.executor.clone(),
            on_success: None,
            on_error: None,
        }
    }
}

impl fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("session", &self.session.is_some())
            .field("statement", &self.statement)
            .field("keywordize", &self.keywordize)
            .field("values", &self.values)
            .field("executor", &self.executor.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

fn input_kind(input: &QueryInput) -> &'static str {
    match input {
        QueryInput::Raw(_) => "raw",
        QueryInput::Structured(_) => "structured",
        QueryInput::Prepared(_) => "prepared",
    }
}

impl Context {
    fn resolve(
        &self,
        input: &QueryInput,
        options: &ExecuteOptions,
    ) -> Result<(Arc<dyn Session>, ExecutableStatement)> {
        let session = options
            .session
            .clone()
            .or_else(|| self.session().cloned())
            .ok_or(Error::NoSession)?;
        if let Some(serial) = options.statement.serial_consistency {
            if !serial.is_serial() {
                return Err(Error::Invalid(format!(
                    "{serial} is not a serial consistency level"
                )));
            }
        }
        let statement = to_statement(
            input,
            options.values.as_deref(),
            &**self.query_cache(),
            self.codec(),
        )?;
        let statement = apply_options(statement, &options.statement, self.consistency());
        Ok((session, statement))
    }

    /// Runs `query` and blocks until the records are decoded.
    pub fn execute(
        &self,
        query: impl Into<QueryInput>,
        options: ExecuteOptions,
    ) -> Result<Vec<Record>> {
        let input = query.into();
        let (session, statement) = self.resolve(&input, &options)?;
        let keywordize = options.keywordize.unwrap_or(self.keywordize());
        debug!(
            kind = input_kind(&input),
            consistency = %statement.consistency(),
            "executing statement"
        );
        let result = session.execute(&statement)?;
        decode_result_set(&result, keywordize)
    }

    /// Submits `query` and returns a slot that receives the outcome.
    ///
    /// Callbacks run on the per-call executor, else the context's, else [`shared_pool`].
    pub fn execute_async(
        &self,
        query: impl Into<QueryInput>,
        options: ExecuteOptions,
    ) -> Result<AsyncResult> {
        let input = query.into();
        let (session, statement) = self.resolve(&input, &options)?;
        let keywordize = options.keywordize.unwrap_or(self.keywordize());
        let executor = options
            .executor
            .or_else(|| self.executor().cloned())
            .unwrap_or_else(shared_pool);
        debug!(
            kind = input_kind(&input),
            consistency = %statement.consistency(),
            "submitting statement"
        );

        let slot = AsyncResult::new();
        let future = session.execute_async(statement);
        Completion {
            slot: slot.clone(),
            keywordize,
            on_success: options.on_success,
            on_error: options.on_error,
        }
        .attach(&future, executor);
        Ok(slot)
    }

    /// Prepares `query` on the context's session.
    ///
    /// Structured queries are compiled through the query cache first. A prepared input
    /// is returned unchanged and does not need a session.
    pub fn prepare(&self, query: impl Into<QueryInput>) -> Result<PreparedHandle> {
        let text = match query.into() {
            QueryInput::Prepared(handle) => return Ok(handle),
            QueryInput::Raw(text) => text,
            QueryInput::Structured(query) => self.query_cache().resolve_raw(&query)?,
        };
        let session = self.session().ok_or(Error::NoSession)?;
        debug!(query = %text, "preparing statement");
        Ok(session.prepare(&text)?)
    }

    /// Runs `query`, then keeps running whatever `next` returns for the previous query
    /// and its records, yielding every record in order.
    ///
    /// Pages are fetched on demand. Iteration ends when `next` returns `None` or after
    /// the first error. Callbacks in `options` are ignored.
    pub fn lazy_query<F>(
        &self,
        query: impl Into<QueryInput>,
        options: ExecuteOptions,
        next: F,
    ) -> LazyQuery<F>
    where
        F: FnMut(&QueryInput, &[Record]) -> Option<QueryInput>,
    {
        LazyQuery {
            context: self.clone(),
            options: options.without_callbacks(),
            next,
            pending: Some(query.into()),
            last_query: None,
            chunk: Vec::new(),
            position: 0,
            done: false,
        }
    }
}

/// Iterator over the records of a chain of queries; see [`Context::lazy_query`].
pub struct LazyQuery<F> {
    context: Context,
    options: ExecuteOptions,
    next: F,
    pending: Option<QueryInput>,
    last_query: Option<QueryInput>,
    chunk: Vec<Record>,
    position: usize,
    done: bool,
}

impl<F> Iterator for LazyQuery<F>
where
    F: FnMut(&QueryInput, &[Record]) -> Option<QueryInput>,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.chunk.get(self.position) {
                self.position += 1;
                return Some(Ok(record.clone()));
            }
            if self.done {
                return None;
            }
            let query = match (self.pending.take(), self.last_query.as_ref()) {
                (Some(query), _) => query,
                (None, Some(last)) => match (self.next)(last, &self.chunk) {
                    Some(query) => query,
                    None => {
                        self.done = true;
                        return None;
                    }
                },
                (None, None) => {
                    self.done = true;
                    return None;
                }
            };
            match self
                .context
                .execute(query.clone(), self.options.without_callbacks())
            {
                Ok(records) => {
                    debug!(rows = records.len(), "lazy query chunk");
                    self.chunk = records;
                    self.position = 0;
                    self.last_query = Some(query);
                }
                Err(err) => {
                    self.done = true;
                    self.chunk.clear();
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<F> fmt::Debug for LazyQuery<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyQuery")
            .field("last_query", &self.last_query)
            .field("buffered", &(self.chunk.len() - self.position.min(self.chunk.len())))
            .field("done", &self.done)
            .finish()
    }
}

/// [`Context::execute`] with the ambient context.
pub fn execute(query: impl Into<QueryInput>, options: ExecuteOptions) -> Result<Vec<Record>> {
    Context::current().execute(query, options)
}

/// [`Context::execute_async`] with the ambient context.
pub fn execute_async(query: impl Into<QueryInput>, options: ExecuteOptions) -> Result<AsyncResult> {
    Context::current().execute_async(query, options)
}

/// [`Context::prepare`] with the ambient context.
pub fn prepare(query: impl Into<QueryInput>) -> Result<PreparedHandle> {
    Context::current().prepare(query)
}

/// [`Context::lazy_query`] with the ambient context, captured at call time.
pub fn lazy_query<F>(query: impl Into<QueryInput>, options: ExecuteOptions, next: F) -> LazyQuery<F>
where
    F: FnMut(&QueryInput, &[Record]) -> Option<QueryInput>,
{
    Context::current().lazy_query(query, options, next)
}
