//! Task entity, its status machine, and related types.

use super::{
    ExecutionError, ParseTaskError, PipelineDomainError, PipelineId, StageId, TaskId, TaskPayload,
};
use crate::instance::domain::{DatabaseId, InstanceId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting to be dispatched.
    Pending,
    /// Claimed by the scheduler and executing.
    Running,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
    /// Stopped by request.
    Canceled,
}

impl TaskStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Returns whether the status ends a run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Canceled)
    }

    /// Returns whether moving to `target` is a permitted transition.
    ///
    /// ```
    /// use schemaflow::pipeline::domain::TaskStatus;
    ///
    /// assert!(TaskStatus::Failed.can_transition_to(TaskStatus::Pending));
    /// assert!(!TaskStatus::Done.can_transition_to(TaskStatus::Pending));
    /// ```
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Running | Self::Canceled)
                | (Self::Running, Self::Done | Self::Failed | Self::Canceled)
                | (Self::Failed | Self::Canceled, Self::Pending)
        )
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            "CANCELED" => Ok(Self::Canceled),
            _ => Err(ParseTaskError {
                kind: "status",
                value: value.to_owned(),
            }),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskType {
    /// No-op placeholder.
    #[serde(rename = "bb.task.general")]
    General,
    /// Creates a database.
    #[serde(rename = "bb.task.database.create")]
    DatabaseCreate,
    /// Applies a migration script.
    #[serde(rename = "bb.task.database.schema.update")]
    DatabaseSchemaUpdate,
    /// Writes a backup artifact.
    #[serde(rename = "bb.task.database.backup")]
    DatabaseBackup,
    /// Replays a backup or script.
    #[serde(rename = "bb.task.database.restore")]
    DatabaseRestore,
}

impl TaskType {
    /// Every task type, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::General,
        Self::DatabaseCreate,
        Self::DatabaseSchemaUpdate,
        Self::DatabaseBackup,
        Self::DatabaseRestore,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "bb.task.general",
            Self::DatabaseCreate => "bb.task.database.create",
            Self::DatabaseSchemaUpdate => "bb.task.database.schema.update",
            Self::DatabaseBackup => "bb.task.database.backup",
            Self::DatabaseRestore => "bb.task.database.restore",
        }
    }
}

impl TryFrom<&str> for TaskType {
    type Error = ParseTaskError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|task_type| task_type.as_str() == value.trim())
            .ok_or_else(|| ParseTaskError {
                kind: "type",
                value: value.to_owned(),
            })
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource a running task holds exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKey {
    /// A single database.
    Database(DatabaseId),
    /// A whole instance, used by tasks with no database yet.
    Instance(InstanceId),
}

/// Summary of a successful execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Human-readable outcome.
    pub detail: String,
    /// Location of a produced artifact, such as a backup file.
    pub artifact: Option<String>,
}

impl TaskResult {
    /// Creates a result with only a detail message.
    #[must_use]
    pub fn detail(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            artifact: None,
        }
    }

    /// Attaches an artifact location.
    #[must_use]
    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }
}

/// Declaration of a task inside a new pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Display name.
    pub name: String,
    /// Target instance.
    pub instance_id: InstanceId,
    /// Target database, required by schema updates and backups.
    pub database_id: Option<DatabaseId>,
    /// Work to perform.
    pub payload: TaskPayload,
}

/// Parameter object for reconstructing a persisted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Owning pipeline.
    pub pipeline_id: PipelineId,
    /// Owning stage.
    pub stage_id: StageId,
    /// Display name.
    pub name: String,
    /// Target instance.
    pub instance_id: InstanceId,
    /// Target database, if any.
    pub database_id: Option<DatabaseId>,
    /// Work to perform.
    pub payload: TaskPayload,
    /// Persisted status.
    pub status: TaskStatus,
    /// Error from the latest failed run.
    pub error: Option<ExecutionError>,
    /// Result of the latest successful run.
    pub result: Option<TaskResult>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When the latest run started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the latest run ended.
    pub completed_at: Option<DateTime<Utc>>,
    /// Latest change timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Unit of work against one instance or database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    pipeline_id: PipelineId,
    stage_id: StageId,
    name: String,
    instance_id: InstanceId,
    database_id: Option<DatabaseId>,
    payload: TaskPayload,
    status: TaskStatus,
    error: Option<ExecutionError>,
    result: Option<TaskResult>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a pending task from its declaration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::EmptyName`] for a blank name or
    /// [`PipelineDomainError::MissingDatabase`] when the payload needs a
    /// target database that was not given.
    pub fn new(
        pipeline_id: PipelineId,
        stage_id: StageId,
        spec: TaskSpec,
        clock: &impl Clock,
    ) -> Result<Self, PipelineDomainError> {
        let name = spec.name.trim().to_owned();
        if name.is_empty() {
            return Err(PipelineDomainError::EmptyName("task"));
        }
        let needs_database = matches!(
            spec.payload.task_type(),
            TaskType::DatabaseSchemaUpdate | TaskType::DatabaseBackup
        );
        if needs_database && spec.database_id.is_none() {
            return Err(PipelineDomainError::MissingDatabase(name));
        }

        let timestamp = clock.utc();
        Ok(Self {
            id: TaskId::new(),
            pipeline_id,
            stage_id,
            name,
            instance_id: spec.instance_id,
            database_id: spec.database_id,
            payload: spec.payload,
            status: TaskStatus::Pending,
            error: None,
            result: None,
            created_at: timestamp,
            started_at: None,
            completed_at: None,
            updated_at: timestamp,
        })
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            pipeline_id: data.pipeline_id,
            stage_id: data.stage_id,
            name: data.name,
            instance_id: data.instance_id,
            database_id: data.database_id,
            payload: data.payload,
            status: data.status,
            error: data.error,
            result: data.result,
            created_at: data.created_at,
            started_at: data.started_at,
            completed_at: data.completed_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the owning pipeline.
    #[must_use]
    pub const fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    /// Returns the owning stage.
    #[must_use]
    pub const fn stage_id(&self) -> StageId {
        self.stage_id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the target instance.
    #[must_use]
    pub const fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Returns the target database, if any.
    #[must_use]
    pub const fn database_id(&self) -> Option<DatabaseId> {
        self.database_id
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &TaskPayload {
        &self.payload
    }

    /// Returns the task type derived from the payload.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        self.payload.task_type()
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the error from the latest failed run.
    #[must_use]
    pub const fn error(&self) -> Option<&ExecutionError> {
        self.error.as_ref()
    }

    /// Returns the result of the latest successful run.
    #[must_use]
    pub const fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the latest run started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns when the latest run ended.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the latest change timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the resource this task holds while running.
    #[must_use]
    pub const fn target(&self) -> TargetKey {
        match self.database_id {
            Some(database_id) => TargetKey::Database(database_id),
            None => TargetKey::Instance(self.instance_id),
        }
    }

    /// Claims the task for execution.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::InvalidStateTransition`] unless the
    /// task is pending.
    pub fn start(&mut self, clock: &impl Clock) -> Result<(), PipelineDomainError> {
        self.transition_to(TaskStatus::Running)?;
        let timestamp = clock.utc();
        self.started_at = Some(timestamp);
        self.updated_at = timestamp;
        Ok(())
    }

    /// Marks a running task as done.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::InvalidStateTransition`] unless the
    /// task is running.
    pub fn complete(
        &mut self,
        result: TaskResult,
        clock: &impl Clock,
    ) -> Result<(), PipelineDomainError> {
        self.transition_to(TaskStatus::Done)?;
        self.result = Some(result);
        self.finish(clock);
        Ok(())
    }

    /// Marks a running task as failed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::InvalidStateTransition`] unless the
    /// task is running.
    pub fn fail(
        &mut self,
        error: ExecutionError,
        clock: &impl Clock,
    ) -> Result<(), PipelineDomainError> {
        self.transition_to(TaskStatus::Failed)?;
        self.error = Some(error);
        self.finish(clock);
        Ok(())
    }

    /// Cancels a pending or running task.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::InvalidStateTransition`] when the task
    /// has already finished.
    pub fn cancel(
        &mut self,
        reason: Option<ExecutionError>,
        clock: &impl Clock,
    ) -> Result<(), PipelineDomainError> {
        self.transition_to(TaskStatus::Canceled)?;
        self.error = reason;
        self.finish(clock);
        Ok(())
    }

    /// Puts a failed or canceled task back into the queue.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::InvalidStateTransition`] unless the
    /// task is failed or canceled.
    pub fn resubmit(&mut self, clock: &impl Clock) -> Result<(), PipelineDomainError> {
        self.transition_to(TaskStatus::Pending)?;
        self.error = None;
        self.result = None;
        self.started_at = None;
        self.completed_at = None;
        self.updated_at = clock.utc();
        Ok(())
    }

    fn finish(&mut self, clock: &impl Clock) {
        let timestamp = clock.utc();
        self.completed_at = Some(timestamp);
        self.updated_at = timestamp;
    }

    const fn transition_to(&mut self, target: TaskStatus) -> Result<(), PipelineDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(PipelineDomainError::InvalidStateTransition {
                task_id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }
}
