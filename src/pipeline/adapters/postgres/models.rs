//! Diesel row models for pipeline persistence.

use super::schema::{activities, migration_history, pipelines, stages, tasks};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

/// Query and insert row for pipeline headers.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = pipelines)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PipelineRow {
    /// Pipeline identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Optional issue reference.
    pub issue_ref: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Query and insert row for stages.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = stages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StageRow {
    /// Stage identifier.
    pub id: Uuid,
    /// Owning pipeline.
    pub pipeline_id: Uuid,
    /// Position within the pipeline.
    pub position: i32,
    /// Display name.
    pub name: String,
    /// Target environment name.
    pub environment: String,
}

/// Query and insert row for tasks.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    /// Task identifier.
    pub id: Uuid,
    /// Owning pipeline.
    pub pipeline_id: Uuid,
    /// Owning stage.
    pub stage_id: Uuid,
    /// Position within the stage.
    pub position: i32,
    /// Display name.
    pub name: String,
    /// Target instance.
    pub instance_id: Uuid,
    /// Target database.
    pub database_id: Option<Uuid>,
    /// Task type name.
    pub task_type: String,
    /// Typed payload.
    pub payload: Value,
    /// Lifecycle status.
    pub status: String,
    /// Error from the latest failed run.
    pub error: Option<Value>,
    /// Result of the latest successful run.
    pub result: Option<Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When the latest run started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the latest run ended.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Changeset for task status updates.
///
/// `None` clears the column so a resubmitted task drops its previous run.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = tasks)]
#[diesel(treat_none_as_null = true)]
pub struct TaskStatusChangeset {
    /// Lifecycle status.
    pub status: String,
    /// Error from the latest failed run.
    pub error: Option<Value>,
    /// Result of the latest successful run.
    pub result: Option<Value>,
    /// When the latest run started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the latest run ended.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Query and insert row for migration history.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = migration_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MigrationHistoryRow {
    /// Entry identifier.
    pub id: Uuid,
    /// Position in the per-database ledger.
    pub sequence: i64,
    /// Task that applied the change.
    pub task_id: Uuid,
    /// Instance hosting the database.
    pub instance_id: Uuid,
    /// Database name.
    pub database_name: String,
    /// Optional issue reference.
    pub issue_ref: Option<String>,
    /// Migration engine.
    pub engine: String,
    /// Migration type.
    pub migration_type: String,
    /// Declared version.
    pub version: String,
    /// Description.
    pub description: String,
    /// Executed statement text.
    pub statement: String,
    /// Execution time in milliseconds.
    pub execution_duration_ms: i64,
    /// Extra details.
    pub payload: Value,
    /// Append timestamp.
    pub created_at: DateTime<Utc>,
}

/// Query and insert row for activities.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = activities)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ActivityRow {
    /// Entry identifier.
    pub id: Uuid,
    /// Container kind.
    pub container_type: String,
    /// Container identifier.
    pub container_id: String,
    /// Activity type name.
    pub activity_type: String,
    /// Severity.
    pub level: String,
    /// Free-form comment.
    pub comment: String,
    /// Structured payload.
    pub payload: Value,
    /// Append timestamp.
    pub created_at: DateTime<Utc>,
}
