//! In-process session for tests.
//!
//! [`MemorySession`] answers statements through a handler closure instead of a network
//! round trip and records what it was asked to do, so callers can assert on the
//! statements, consistency levels, and prepared queries that reached the driver.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::codec::{ResultSet, WireValue};
use crate::error::{DriverError, DriverErrorKind};
use crate::query::statement::ExecutableStatement;
use crate::session::{
    Cluster, ClusterFactory, ClusterOptions, DriverFuture, DriverOutcome, DriverPromise,
    PreparedHandle, PreparedStatement, Session,
};

type Handler = Arc<dyn Fn(&ExecutableStatement) -> DriverOutcome + Send + Sync>;

/// How [`Session::execute_async`] completes its futures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AsyncMode {
    /// Each request is answered on a fresh background thread.
    #[default]
    Background,
    /// Requests wait until [`MemorySession::release_pending`] is called.
    Manual,
}

struct Shared {
    handler: Mutex<Handler>,
    keyspace: Option<String>,
    closed: AtomicBool,
    executed: AtomicUsize,
    submitted: Mutex<Vec<ExecutableStatement>>,
    prepared: Mutex<Vec<String>>,
    pending: Mutex<VecDeque<(ExecutableStatement, DriverPromise)>>,
    mode: Mutex<AsyncMode>,
}

/// Session backed by a closure.
///
/// The default handler answers every statement with an empty [`ResultSet`].
#[derive(Clone)]
pub struct MemorySession {
    shared: Arc<Shared>,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    /// Session that answers every statement with an empty result.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                handler: Mutex::new(Arc::new(empty_result)),
                keyspace: None,
                closed: AtomicBool::new(false),
                executed: AtomicUsize::new(0),
                submitted: Mutex::new(Vec::new()),
                prepared: Mutex::new(Vec::new()),
                pending: Mutex::new(VecDeque::new()),
                mode: Mutex::new(AsyncMode::default()),
            }),
        }
    }

    /// Answers statements with `handler`.
    pub fn with_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&ExecutableStatement) -> DriverOutcome + Send + Sync + 'static,
    {
        self.set_handler(handler);
        self
    }

    /// Replaces the handler; requests already answered are unaffected.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&ExecutableStatement) -> DriverOutcome + Send + Sync + 'static,
    {
        *self.shared.handler.lock() = Arc::new(handler);
    }

    /// Reports `keyspace` from [`Session::keyspace`].
    ///
    /// Must be called before the session is cloned or shared.
    pub fn with_keyspace(self, keyspace: impl Into<String>) -> Self {
        let keyspace = Some(keyspace.into());
        match Arc::try_unwrap(self.shared) {
            Ok(mut shared) => {
                shared.keyspace = keyspace;
                Self {
                    shared: Arc::new(shared),
                }
            }
            Err(shared) => {
                warn!("keyspace ignored on a shared memory session");
                Self { shared }
            }
        }
    }

    /// Selects how async requests complete.
    pub fn with_async_mode(self, mode: AsyncMode) -> Self {
        *self.shared.mode.lock() = mode;
        self
    }

    /// Answers every request parked in [`AsyncMode::Manual`], in submission order, on
    /// the calling thread. Returns how many were released.
    pub fn release_pending(&self) -> usize {
        let pending: Vec<_> = self.shared.pending.lock().drain(..).collect();
        let released = pending.len();
        for (statement, promise) in pending {
            let outcome = self.answer(&statement);
            promise.complete(outcome);
        }
        released
    }

    /// Drops every parked request; their futures complete as aborted.
    pub fn abandon_pending(&self) -> usize {
        let pending: Vec<_> = self.shared.pending.lock().drain(..).collect();
        pending.len()
    }

    /// Statements submitted through [`Session::execute_async`].
    pub fn submitted(&self) -> Vec<ExecutableStatement> {
        self.shared.submitted.lock().clone()
    }

    /// Number of statements that reached the handler, sync or async.
    pub fn execute_count(&self) -> usize {
        self.shared.executed.load(Ordering::SeqCst)
    }

    /// Query texts prepared on this session, in order.
    pub fn prepared_queries(&self) -> Vec<String> {
        self.shared.prepared.lock().clone()
    }

    /// Whether [`Session::shutdown`] was called.
    pub fn is_shut_down(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn answer(&self, statement: &ExecutableStatement) -> DriverOutcome {
        if self.is_shut_down() {
            return Err(closed_error());
        }
        self.shared.executed.fetch_add(1, Ordering::SeqCst);
        let handler = self.shared.handler.lock().clone();
        handler(statement)
    }
}

fn empty_result(_: &ExecutableStatement) -> DriverOutcome {
    Ok(ResultSet::empty())
}

fn closed_error() -> DriverError {
    DriverError::new(DriverErrorKind::Connection, "session is shut down")
}

impl Session for MemorySession {
    fn execute(&self, statement: &ExecutableStatement) -> DriverOutcome {
        debug!(query = statement.statement().text(), "memory session execute");
        self.answer(statement)
    }

    fn execute_async(&self, statement: ExecutableStatement) -> DriverFuture {
        self.shared.submitted.lock().push(statement.clone());
        if self.is_shut_down() {
            return DriverFuture::ready(Err(closed_error()));
        }
        let (future, promise) = DriverFuture::pending();
        let mode = *self.shared.mode.lock();
        match mode {
            AsyncMode::Manual => self.shared.pending.lock().push_back((statement, promise)),
            AsyncMode::Background => {
                let session = self.clone();
                let spawned = std::thread::Builder::new()
                    .name("corvid-memory-session".into())
                    .spawn(move || {
                        let outcome = session.answer(&statement);
                        promise.complete(outcome);
                    });
                // A failed spawn drops the promise, which aborts the request.
                if let Err(err) = spawned {
                    warn!(error = %err, "failed to spawn memory session worker");
                }
            }
        }
        future
    }

    fn prepare(&self, query: &str) -> Result<PreparedHandle, DriverError> {
        if self.is_shut_down() {
            return Err(closed_error());
        }
        self.shared.prepared.lock().push(query.to_owned());
        Ok(Arc::new(MemoryPrepared {
            query: query.to_owned(),
            arity: count_placeholders(query),
            session: self.clone(),
        }))
    }

    fn keyspace(&self) -> Option<String> {
        self.shared.keyspace.clone()
    }

    fn shutdown(&self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            debug!("memory session shut down");
        }
    }
}

impl fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySession")
            .field("keyspace", &self.shared.keyspace)
            .field("closed", &self.is_shut_down())
            .field("executed", &self.execute_count())
            .finish()
    }
}

/// Prepared statement created by [`MemorySession::prepare`].
pub struct MemoryPrepared {
    query: String,
    arity: usize,
    session: MemorySession,
}

impl MemoryPrepared {
    /// Number of `?` markers in the query.
    pub fn arity(&self) -> usize {
        self.arity
    }
}

impl PreparedStatement for MemoryPrepared {
    fn query(&self) -> &str {
        &self.query
    }

    fn validate_bind(&self, values: &[WireValue]) -> Result<(), DriverError> {
        if self.session.is_shut_down() {
            return Err(closed_error());
        }
        if values.len() != self.arity {
            return Err(DriverError::bind_arity(self.arity, values.len()));
        }
        Ok(())
    }
}

impl fmt::Debug for MemoryPrepared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPrepared")
            .field("query", &self.query)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Counts `?` bind markers outside quoted literals and identifiers.
fn count_placeholders(query: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;
    for ch in query.chars() {
        match (quote, ch) {
            (None, '\'' | '"') => quote = Some(ch),
            (None, '?') => count += 1,
            // a doubled quote re-enters the literal on the next char
            (Some(q), c) if c == q => quote = None,
            _ => {}
        }
    }
    count
}

/// Cluster whose sessions are [`MemorySession`]s sharing one handler.
pub struct MemoryCluster {
    options: ClusterOptions,
    template: MemorySession,
    sessions: Mutex<Vec<MemorySession>>,
    closed: AtomicBool,
}

impl MemoryCluster {
    /// Options the cluster was built with.
    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    /// Sessions opened so far.
    pub fn sessions(&self) -> Vec<MemorySession> {
        self.sessions.lock().clone()
    }

    /// Whether [`Cluster::shutdown`] was called.
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Cluster for MemoryCluster {
    fn connect(&self, keyspace: Option<&str>) -> Result<Arc<dyn Session>, DriverError> {
        if self.is_shut_down() {
            return Err(DriverError::new(
                DriverErrorKind::Connection,
                "cluster is shut down",
            ));
        }
        let handler = self.template.shared.handler.lock().clone();
        let mut session = MemorySession::new();
        if let Some(keyspace) = keyspace {
            session = session.with_keyspace(keyspace);
        }
        *session.shared.handler.lock() = handler;
        self.sessions.lock().push(session.clone());
        Ok(Arc::new(session))
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for session in self.sessions.lock().iter() {
            session.shutdown();
        }
    }
}

impl fmt::Debug for MemoryCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCluster")
            .field("contact_points", &self.options.contact_points)
            .field("sessions", &self.sessions.lock().len())
            .field("closed", &self.is_shut_down())
            .finish()
    }
}

/// Factory producing [`MemoryCluster`]s.
///
/// Keeps the clusters it built so tests can inspect them.
#[derive(Default)]
pub struct MemoryClusterFactory {
    template: MemorySession,
    built: Mutex<Vec<Arc<MemoryCluster>>>,
}

impl MemoryClusterFactory {
    /// Factory whose sessions answer with empty results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory whose sessions answer with `handler`.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&ExecutableStatement) -> DriverOutcome + Send + Sync + 'static,
    {
        Self {
            template: MemorySession::new().with_handler(handler),
            built: Mutex::new(Vec::new()),
        }
    }

    /// Clusters built so far.
    pub fn clusters(&self) -> Vec<Arc<MemoryCluster>> {
        self.built.lock().clone()
    }
}

impl ClusterFactory for MemoryClusterFactory {
    fn build(&self, options: &ClusterOptions) -> Result<Arc<dyn Cluster>, DriverError> {
        if options.contact_points.is_empty() {
            return Err(DriverError::new(
                DriverErrorKind::Connection,
                "no contact points",
            ));
        }
        let cluster = Arc::new(MemoryCluster {
            options: options.clone(),
            template: self.template.clone(),
            sessions: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.built.lock().push(cluster.clone());
        Ok(cluster)
    }
}
