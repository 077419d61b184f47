//! Repository port for pipelines, task status, and migration history.

use crate::instance::domain::{DatabaseId, InstanceId};
use crate::pipeline::domain::{
    IssueRef, MigrationHistory, NewMigrationHistory, Pipeline, PipelineId, Stage, StageId, Task,
    TaskId, TaskStatus, TaskType,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for pipeline repository operations.
pub type PipelineRepositoryResult<T> = Result<T, PipelineRepositoryError>;

/// Pipeline persistence contract.
///
/// Migration history is append-only: entries are only ever added through
/// [`PipelineRepository::record_outcome`].
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    /// Stores a new pipeline with all of its stages and tasks.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRepositoryError::DuplicatePipeline`] when the ID
    /// already exists.
    async fn store(&self, pipeline: &Pipeline) -> PipelineRepositoryResult<()>;

    /// Finds a pipeline by identifier.
    async fn find_pipeline(&self, id: PipelineId) -> PipelineRepositoryResult<Option<Pipeline>>;

    /// Finds a stage by identifier.
    async fn find_stage(&self, id: StageId) -> PipelineRepositoryResult<Option<Stage>>;

    /// Finds a task by identifier.
    async fn find_task(&self, id: TaskId) -> PipelineRepositoryResult<Option<Task>>;

    /// Returns the pipelines filed under an issue, oldest first.
    async fn list_pipelines_by_issue(
        &self,
        issue: &IssueRef,
    ) -> PipelineRepositoryResult<Vec<Pipeline>>;

    /// Returns pipelines with at least one pending or running task, oldest
    /// first.
    async fn list_active(&self) -> PipelineRepositoryResult<Vec<Pipeline>>;

    /// Returns every task in the given status.
    async fn list_tasks_by_status(&self, status: TaskStatus)
    -> PipelineRepositoryResult<Vec<Task>>;

    /// Returns the most recently created task of a type targeting a
    /// database.
    async fn latest_task_for_database(
        &self,
        database_id: DatabaseId,
        task_type: TaskType,
    ) -> PipelineRepositoryResult<Option<Task>>;

    /// Persists a task status change.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRepositoryError::TaskNotFound`] when the task does
    /// not exist.
    async fn update_task(&self, task: &Task) -> PipelineRepositoryResult<()>;

    /// Persists a finished task and, for applied migrations, appends its
    /// history entry in the same atomic step.
    ///
    /// The entry receives the next sequence number for its database.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRepositoryError::TaskNotFound`] when the task does
    /// not exist or [`PipelineRepositoryError::DuplicateHistory`] when the
    /// task already has a history entry.
    async fn record_outcome(
        &self,
        task: &Task,
        history: Option<NewMigrationHistory>,
    ) -> PipelineRepositoryResult<Option<MigrationHistory>>;

    /// Returns the migration history of a database in sequence order.
    async fn list_migration_history(
        &self,
        instance_id: InstanceId,
        database_name: &str,
    ) -> PipelineRepositoryResult<Vec<MigrationHistory>>;
}

/// Errors returned by pipeline repository implementations.
#[derive(Debug, Clone, Error)]
pub enum PipelineRepositoryError {
    /// A pipeline with the same identifier already exists.
    #[error("duplicate pipeline identifier: {0}")]
    DuplicatePipeline(PipelineId),

    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// A history entry for the task already exists.
    #[error("migration history already recorded for task {0}")]
    DuplicateHistory(TaskId),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl PipelineRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
