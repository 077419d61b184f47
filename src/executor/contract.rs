//! Executor contract shared by every task type.

use crate::pipeline::domain::{
    ExecutionError, ExecutionErrorKind, MigrationRecord, Task, TaskResult,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Per-run context handed to an executor.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    cancel: CancellationToken,
}

impl ExecutionContext {
    /// Creates a context observing the given cancellation token.
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Returns the token signalled when the task is canceled.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails with a canceled error once cancellation has been requested.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`ExecutionErrorKind::Canceled`] when the
    /// token has fired.
    pub fn ensure_active(&self) -> Result<(), ExecutionError> {
        if self.cancel.is_cancelled() {
            return Err(ExecutionError::new(
                ExecutionErrorKind::Canceled,
                "canceled before completion",
            ));
        }
        Ok(())
    }
}

/// Successful executor outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    /// Result stored on the task.
    pub result: TaskResult,
    /// Migration history entry written with the status update.
    pub migration: Option<MigrationRecord>,
}

impl ExecutionOutput {
    /// Creates an output without a migration entry.
    #[must_use]
    pub const fn new(result: TaskResult) -> Self {
        Self {
            result,
            migration: None,
        }
    }

    /// Attaches a migration entry.
    #[must_use]
    pub fn with_migration(mut self, record: MigrationRecord) -> Self {
        self.migration = Some(record);
        self
    }
}

/// Runs tasks of one type.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Executes `task` to completion.
    ///
    /// Implementations check `ctx` between statements and return an error of
    /// kind [`Canceled`](crate::pipeline::domain::ExecutionErrorKind::Canceled)
    /// once cancellation is observed.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] describing why the task failed.
    async fn run(&self, ctx: &ExecutionContext, task: &Task)
    -> Result<ExecutionOutput, ExecutionError>;
}
