//! Error types for script replay.

use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a connection while executing one statement.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct StatementError {
    message: String,
}

impl StatementError {
    /// Creates a statement error from a driver message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the driver message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors that abort a script replay.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    /// Reading the next script line failed.
    #[error("read script line: {0}")]
    Read(Arc<std::io::Error>),

    /// A statement was rejected by the connection.
    #[error("execute query {statement:?} failed: {source}")]
    Statement {
        /// Full text of the rejected statement.
        statement: String,
        /// Error reported by the connection.
        #[source]
        source: StatementError,
    },

    /// Cancellation was observed before the next statement ran.
    #[error("script replay canceled after {executed} statement(s)")]
    Canceled {
        /// Number of statements already applied.
        executed: usize,
    },
}

impl From<std::io::Error> for ScriptError {
    fn from(err: std::io::Error) -> Self {
        Self::Read(Arc::new(err))
    }
}
