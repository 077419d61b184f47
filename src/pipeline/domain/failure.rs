//! Structured failure recorded on a task.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad category of an execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    /// The target instance could not be reached.
    Connectivity,
    /// A SQL statement was rejected.
    Statement,
    /// Reading or writing a backup artifact failed.
    Storage,
    /// The task payload or its target is unusable.
    InvalidPayload,
    /// The task was canceled by request.
    Canceled,
    /// The process stopped while the task was running.
    Interrupted,
    /// An unexpected internal fault, including executor panics.
    Internal,
}

impl ExecutionErrorKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connectivity => "connectivity",
            Self::Statement => "statement",
            Self::Storage => "storage",
            Self::InvalidPayload => "invalid_payload",
            Self::Canceled => "canceled",
            Self::Interrupted => "interrupted",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure returned by an executor and stored on the failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    kind: ExecutionErrorKind,
    message: String,
    statement: Option<String>,
}

impl ExecutionError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            statement: None,
        }
    }

    /// Attaches the statement that failed.
    #[must_use]
    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    /// Shorthand for an [`ExecutionErrorKind::InvalidPayload`] error.
    #[must_use]
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::InvalidPayload, message)
    }

    /// Shorthand for an [`ExecutionErrorKind::Internal`] error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Internal, message)
    }

    /// Shorthand for an [`ExecutionErrorKind::Interrupted`] error.
    #[must_use]
    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Interrupted, message)
    }

    /// Returns the failure category.
    #[must_use]
    pub const fn kind(&self) -> ExecutionErrorKind {
        self.kind
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the failing statement, when one was involved.
    #[must_use]
    pub fn statement(&self) -> Option<&str> {
        self.statement.as_deref()
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(statement) = &self.statement {
            write!(f, " (statement: {statement:?})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecutionError {}
