//! Executor for bookkeeping tasks with no side effects.

use super::{ExecutionContext, ExecutionOutput, TaskExecutor};
use crate::pipeline::domain::{ExecutionError, Task, TaskResult};
use async_trait::async_trait;

/// Completes immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneralExecutor;

#[async_trait]
impl TaskExecutor for GeneralExecutor {
    async fn run(
        &self,
        ctx: &ExecutionContext,
        task: &Task,
    ) -> Result<ExecutionOutput, ExecutionError> {
        ctx.ensure_active()?;
        Ok(ExecutionOutput::new(TaskResult::detail(format!(
            "task {} completed",
            task.name()
        ))))
    }
}
