//! Log subscriber setup.
//!
//! The crate only emits `tracing` events; installing a subscriber is left to the
//! application. [`init_logging`] is a convenience for binaries and tests.

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Failure to install the log subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive did not parse.
    #[error("invalid log level: {0}")]
    InvalidLevel(String),
    /// A global subscriber is already set.
    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Installs a formatting subscriber filtered by `level`, e.g. `"info"` or
/// `"corvid=debug,warn"`.
pub fn init_logging(level: &str) -> Result<(), LoggingError> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidLevel(e.to_string()))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}
