//! Error types for pipeline domain validation and parsing.

use super::{TaskId, TaskStatus};
use thiserror::Error;

/// Errors returned while constructing or mutating pipeline values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineDomainError {
    /// A pipeline, stage, or task name is empty after trimming.
    #[error("{0} name must not be empty")]
    EmptyName(&'static str),

    /// The issue reference is empty after trimming.
    #[error("issue reference must not be empty")]
    EmptyIssueRef,

    /// A pipeline was declared without stages.
    #[error("pipeline must contain at least one stage")]
    NoStages,

    /// A stage was declared without tasks.
    #[error("stage '{0}' must contain at least one task")]
    EmptyStage(String),

    /// A task payload requires a target database that was not given.
    #[error("task '{0}' requires a target database")]
    MissingDatabase(String),

    /// The requested status change is not allowed.
    #[error("task {task_id} cannot move from {from} to {to}")]
    InvalidStateTransition {
        /// Task being changed.
        task_id: TaskId,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },
}

/// Error returned while parsing task enums from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task {kind}: {value}")]
pub struct ParseTaskError {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// Rejected input.
    pub value: String,
}

/// Error returned while parsing migration enums from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown migration {kind}: {value}")]
pub struct ParseMigrationError {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// Rejected input.
    pub value: String,
}

/// Error returned while parsing activity enums from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown activity {kind}: {value}")]
pub struct ParseActivityError {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// Rejected input.
    pub value: String,
}
