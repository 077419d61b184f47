//! Domain model for pipelines, stages, tasks, and their ledgers.

mod activity;
mod error;
mod failure;
mod ids;
mod migration;
mod payload;
mod pipeline;
mod stage;
mod task;

pub use activity::{
    Activity, ActivityContainer, ActivityLevel, ActivityType, TaskStatusUpdatePayload,
};
pub use error::{ParseActivityError, ParseMigrationError, ParseTaskError, PipelineDomainError};
pub use failure::{ExecutionError, ExecutionErrorKind};
pub use ids::{IssueRef, PipelineId, StageId, TaskId};
pub use migration::{
    MigrationEngine, MigrationHistory, MigrationRecord, MigrationType, NewMigrationHistory,
};
pub use payload::{RestoreSource, SchemaUpdatePayload, TaskPayload};
pub use pipeline::{Pipeline, PipelineSpec, PipelineStatus};
pub use stage::{Stage, StageSpec, StageStatus};
pub use task::{PersistedTaskData, TargetKey, Task, TaskResult, TaskSpec, TaskStatus, TaskType};
