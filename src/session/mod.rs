#![forbid(unsafe_code)]

//! Driver-facing interfaces.
//!
//! Networking, pooling, and the wire protocol live behind these traits. The crate only
//! needs a [`Session`] that can run statements (blocking or with a [`DriverFuture`]) and
//! prepare query text, and a [`ClusterFactory`] that builds clusters from opaque options.

pub mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec::{ResultSet, WireValue};
use crate::error::{DriverError, DriverErrorKind};
use crate::exec::executor::Executor;
use crate::query::statement::ExecutableStatement;

/// Outcome delivered by a session for one request.
pub type DriverOutcome = std::result::Result<ResultSet, DriverError>;

/// Handle to a server-side prepared statement.
pub type PreparedHandle = Arc<dyn PreparedStatement>;

/// Connection to a cluster able to run statements.
pub trait Session: Send + Sync {
    /// Runs `statement`, blocking until the server answers.
    fn execute(&self, statement: &ExecutableStatement) -> DriverOutcome;

    /// Submits `statement` and returns immediately.
    fn execute_async(&self, statement: ExecutableStatement) -> DriverFuture;

    /// Prepares `query` on the server.
    fn prepare(&self, query: &str) -> std::result::Result<PreparedHandle, DriverError>;

    /// Keyspace the session is bound to.
    fn keyspace(&self) -> Option<String> {
        None
    }

    /// Releases the session. Prepared handles from it become unusable.
    fn shutdown(&self) {}
}

/// Statement template registered on the server.
pub trait PreparedStatement: fmt::Debug + Send + Sync {
    /// Query text the statement was prepared from.
    fn query(&self) -> &str;

    /// Checks that `values` can be bound, e.g. that the count matches.
    fn validate_bind(&self, values: &[WireValue]) -> std::result::Result<(), DriverError>;
}

/// Opaque retry policy handed to the session with a statement.
pub trait RetryPolicy: fmt::Debug + Send + Sync {
    /// Name for logs and diagnostics.
    fn name(&self) -> &str;
}

type Listener = Box<dyn FnOnce(DriverOutcome) + Send>;

enum FutureState {
    Pending(Vec<(Arc<dyn Executor>, Listener)>),
    Complete(DriverOutcome),
}

/// Completion handle for an asynchronous request.
///
/// Listeners run on the executor they were registered with, once the paired
/// [`DriverPromise`] completes (or immediately if it already has).
#[derive(Clone)]
pub struct DriverFuture {
    state: Arc<Mutex<FutureState>>,
}

/// Driver-side half of a [`DriverFuture`].
///
/// Dropping a promise without completing it completes the future with
/// [`DriverErrorKind::Aborted`].
pub struct DriverPromise {
    state: Option<Arc<Mutex<FutureState>>>,
}

impl DriverFuture {
    /// Creates an unresolved future and the promise that resolves it.
    pub fn pending() -> (DriverFuture, DriverPromise) {
        let state = Arc::new(Mutex::new(FutureState::Pending(Vec::new())));
        (
            DriverFuture {
                state: state.clone(),
            },
            DriverPromise { state: Some(state) },
        )
    }

    /// Creates an already-resolved future.
    pub fn ready(outcome: DriverOutcome) -> DriverFuture {
        DriverFuture {
            state: Arc::new(Mutex::new(FutureState::Complete(outcome))),
        }
    }

    /// Whether the outcome is known.
    pub fn is_complete(&self) -> bool {
        matches!(*self.state.lock(), FutureState::Complete(_))
    }

    /// Registers `listener` to run on `executor` with the outcome.
    pub fn on_complete<F>(&self, executor: Arc<dyn Executor>, listener: F)
    where
        F: FnOnce(DriverOutcome) + Send + 'static,
    {
        let outcome = {
            let mut state = self.state.lock();
            match &mut *state {
                FutureState::Pending(listeners) => {
                    listeners.push((executor, Box::new(listener)));
                    return;
                }
                FutureState::Complete(outcome) => outcome.clone(),
            }
        };
        executor.execute(Box::new(move || listener(outcome)));
    }
}

impl DriverPromise {
    /// Resolves the future, dispatching every registered listener.
    pub fn complete(mut self, outcome: DriverOutcome) {
        self.finish(outcome);
    }

    fn finish(&mut self, outcome: DriverOutcome) {
        let Some(state) = self.state.take() else {
            return;
        };
        let previous =
            std::mem::replace(&mut *state.lock(), FutureState::Complete(outcome.clone()));
        let FutureState::Pending(listeners) = previous else {
            return;
        };
        for (executor, listener) in listeners {
            let outcome = outcome.clone();
            executor.execute(Box::new(move || listener(outcome)));
        }
    }
}

impl Drop for DriverPromise {
    fn drop(&mut self) {
        if self.state.is_some() {
            self.finish(Err(DriverError::new(
                DriverErrorKind::Aborted,
                "request dropped before completion",
            )));
        }
    }
}

/// Options for building a cluster.
///
/// Only `contact_points` and `port` have a fixed shape; everything else is handed to the
/// factory uninterpreted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterOptions {
    /// Seed hosts.
    #[serde(default)]
    pub contact_points: Vec<String>,
    /// Native protocol port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Driver-specific options (authentication, load balancing, ...).
    #[serde(default)]
    pub options: BTreeMap<String, toml::Value>,
}

impl ClusterOptions {
    /// Options with the given contact points.
    pub fn new<I, S>(contact_points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            contact_points: contact_points.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// A built cluster from which sessions are opened.
pub trait Cluster: Send + Sync {
    /// Opens a session, optionally bound to `keyspace`.
    fn connect(&self, keyspace: Option<&str>) -> std::result::Result<Arc<dyn Session>, DriverError>;

    /// Closes the cluster and every session opened from it.
    fn shutdown(&self);
}

/// Builds clusters from options.
pub trait ClusterFactory {
    /// Builds a cluster; connection happens in [`Cluster::connect`].
    fn build(&self, options: &ClusterOptions) -> std::result::Result<Arc<dyn Cluster>, DriverError>;
}

/// Builds a cluster through `factory`.
pub fn cluster(
    factory: &dyn ClusterFactory,
    options: &ClusterOptions,
) -> crate::error::Result<Arc<dyn Cluster>> {
    debug!(contact_points = ?options.contact_points, port = ?options.port, "building cluster");
    Ok(factory.build(options)?)
}

/// Opens a session on `cluster`.
pub fn connect(
    cluster: &dyn Cluster,
    keyspace: Option<&str>,
) -> crate::error::Result<Arc<dyn Session>> {
    let session = cluster.connect(keyspace)?;
    info!(keyspace = keyspace.unwrap_or("<none>"), "session connected");
    Ok(session)
}

/// Shuts down a session.
pub fn shutdown_session(session: &dyn Session) {
    debug!("shutting down session");
    session.shutdown();
}

/// Shuts down a cluster and its sessions.
pub fn shutdown_cluster(cluster: &dyn Cluster) {
    debug!("shutting down cluster");
    cluster.shutdown();
}
