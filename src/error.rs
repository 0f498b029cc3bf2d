use std::fmt;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by statement resolution and execution.
///
/// The type is `Clone` so an [`AsyncResult`](crate::exec::AsyncResult) can hand the
/// same failure to every reader.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Execution was attempted without an explicit or ambient session.
    #[error("no session: pass one explicitly or bind an ambient session")]
    NoSession,
    /// A bind value has no registered wire encoding.
    #[error("bind value {index} of type {type_name} has no registered encoding")]
    Encoding {
        /// Position of the offending value in the bind list.
        index: usize,
        /// Rust type name of the value.
        type_name: &'static str,
    },
    /// The structured-query compiler rejected its input.
    #[error("failed to compile structured query: {0}")]
    Compile(String),
    /// The session reported a failure; the payload is passed through untouched.
    #[error(transparent)]
    Driver(#[from] DriverError),
    /// A column value could not be converted to its native form.
    #[error("failed to decode column '{column}': {reason}")]
    Decode {
        /// Column name as reported by the result set.
        column: String,
        /// Why the conversion failed.
        reason: String,
    },
    /// A result slot was fulfilled a second time.
    #[error("async result already fulfilled")]
    AlreadyFulfilled,
    /// Caller supplied an argument the crate cannot act on.
    #[error("invalid argument: {0}")]
    Invalid(String),
}

impl Error {
    pub(crate) fn decode(column: impl Into<String>, reason: impl fmt::Display) -> Self {
        Error::Decode {
            column: column.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns the driver payload when this error came from the session.
    pub fn as_driver(&self) -> Option<&DriverError> {
        match self {
            Error::Driver(err) => Some(err),
            _ => None,
        }
    }
}

/// Category of a session-reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Bind value count does not match the prepared statement's parameters.
    BindArity {
        /// Parameters declared by the prepared statement.
        expected: usize,
        /// Values supplied by the caller.
        actual: usize,
    },
    /// Not enough replicas were alive to satisfy the consistency level.
    Unavailable,
    /// The coordinator timed out waiting for replicas.
    Timeout,
    /// The server rejected or failed the request.
    Server,
    /// The query text did not parse.
    Syntax,
    /// The connection or session is unusable (including after shutdown).
    Connection,
    /// The request was abandoned before it completed.
    Aborted,
    /// Anything else the driver reports.
    Other,
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverErrorKind::BindArity { expected, actual } => {
                write!(f, "bind arity (expected {expected}, got {actual})")
            }
            DriverErrorKind::Unavailable => f.write_str("unavailable"),
            DriverErrorKind::Timeout => f.write_str("timeout"),
            DriverErrorKind::Server => f.write_str("server"),
            DriverErrorKind::Syntax => f.write_str("syntax"),
            DriverErrorKind::Connection => f.write_str("connection"),
            DriverErrorKind::Aborted => f.write_str("aborted"),
            DriverErrorKind::Other => f.write_str("other"),
        }
    }
}

/// Opaque failure payload produced by a [`Session`](crate::session::Session).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct DriverError {
    /// Failure category.
    pub kind: DriverErrorKind,
    /// Driver-supplied description.
    pub message: String,
}

impl DriverError {
    /// Creates a driver error of the given kind.
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Builds a [`DriverErrorKind::BindArity`] error.
    pub fn bind_arity(expected: usize, actual: usize) -> Self {
        Self::new(
            DriverErrorKind::BindArity { expected, actual },
            format!("prepared statement takes {expected} values, {actual} supplied"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_errors_pass_through_display() {
        let err: Error = DriverError::new(DriverErrorKind::Unavailable, "2 of 3 replicas").into();
        assert_eq!(err.to_string(), "unavailable error: 2 of 3 replicas");
        assert!(err.as_driver().is_some());
    }

    #[test]
    fn bind_arity_reports_both_counts() {
        let err = DriverError::bind_arity(2, 1);
        assert_eq!(
            err.kind,
            DriverErrorKind::BindArity {
                expected: 2,
                actual: 1
            }
        );
        assert!(err.to_string().contains("expected 2, got 1"));
    }
}
