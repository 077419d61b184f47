//! Activity ledger entries.

use super::{IssueRef, ParseActivityError, PipelineId, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityType {
    /// A task changed status.
    #[serde(rename = "bb.pipeline.task.status.update")]
    TaskStatusUpdate,
    /// A failed or canceled task was put back into the queue.
    #[serde(rename = "bb.pipeline.task.resubmit")]
    TaskResubmit,
    /// Cancellation of a task was requested.
    #[serde(rename = "bb.pipeline.task.cancel")]
    TaskCancel,
    /// A database backup was enqueued.
    #[serde(rename = "bb.database.backup.trigger")]
    BackupTrigger,
}

impl ActivityType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskStatusUpdate => "bb.pipeline.task.status.update",
            Self::TaskResubmit => "bb.pipeline.task.resubmit",
            Self::TaskCancel => "bb.pipeline.task.cancel",
            Self::BackupTrigger => "bb.database.backup.trigger",
        }
    }
}

impl TryFrom<&str> for ActivityType {
    type Error = ParseActivityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "bb.pipeline.task.status.update" => Ok(Self::TaskStatusUpdate),
            "bb.pipeline.task.resubmit" => Ok(Self::TaskResubmit),
            "bb.pipeline.task.cancel" => Ok(Self::TaskCancel),
            "bb.database.backup.trigger" => Ok(Self::BackupTrigger),
            _ => Err(ParseActivityError {
                kind: "type",
                value: value.to_owned(),
            }),
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityLevel {
    /// Routine progress.
    Info,
    /// Something needs attention, such as a cancellation.
    Warning,
    /// A failure.
    Error,
}

impl ActivityLevel {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    /// Returns the level matching a task status change.
    #[must_use]
    pub const fn for_status(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Failed => Self::Error,
            TaskStatus::Canceled => Self::Warning,
            TaskStatus::Pending | TaskStatus::Running | TaskStatus::Done => Self::Info,
        }
    }
}

impl TryFrom<&str> for ActivityLevel {
    type Error = ParseActivityError;

    fn try_from(value: &str) -> Result<Self, ParseActivityError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INFO" => Ok(Self::Info),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            _ => Err(ParseActivityError {
                kind: "level",
                value: value.to_owned(),
            }),
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object an activity is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ActivityContainer {
    /// An issue.
    Issue(IssueRef),
    /// A pipeline without an issue.
    Pipeline(PipelineId),
    /// A single task.
    Task(TaskId),
}

impl ActivityContainer {
    /// Returns the container kind for storage.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Issue(_) => "issue",
            Self::Pipeline(_) => "pipeline",
            Self::Task(_) => "task",
        }
    }

    /// Returns the container identifier for storage.
    #[must_use]
    pub fn id_string(&self) -> String {
        match self {
            Self::Issue(issue) => issue.as_str().to_owned(),
            Self::Pipeline(id) => id.to_string(),
            Self::Task(id) => id.to_string(),
        }
    }
}

/// Payload of a [`ActivityType::TaskStatusUpdate`] activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdatePayload {
    /// Task whose status changed.
    pub task_id: TaskId,
    /// Status before the change.
    pub old_status: TaskStatus,
    /// Status after the change.
    pub new_status: TaskStatus,
    /// Issue the pipeline belongs to, if any.
    pub issue_name: Option<String>,
    /// Task display name.
    pub task_name: String,
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    id: Uuid,
    container: ActivityContainer,
    activity_type: ActivityType,
    level: ActivityLevel,
    comment: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl Activity {
    /// Creates an activity.
    #[must_use]
    pub fn new(
        container: ActivityContainer,
        activity_type: ActivityType,
        level: ActivityLevel,
        comment: impl Into<String>,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            container,
            activity_type,
            level,
            comment: comment.into(),
            payload,
            created_at,
        }
    }

    /// Reconstructs an activity from persisted storage.
    #[must_use]
    pub fn from_persisted(
        id: Uuid,
        container: ActivityContainer,
        activity_type: ActivityType,
        level: ActivityLevel,
        comment: String,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            container,
            activity_type,
            level,
            comment,
            payload,
            created_at,
        }
    }

    /// Returns the activity identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the container the activity is filed under.
    #[must_use]
    pub const fn container(&self) -> &ActivityContainer {
        &self.container
    }

    /// Returns the event kind.
    #[must_use]
    pub const fn activity_type(&self) -> ActivityType {
        self.activity_type
    }

    /// Returns the severity.
    #[must_use]
    pub const fn level(&self) -> ActivityLevel {
        self.level
    }

    /// Returns the free-form comment.
    #[must_use]
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Returns the JSON payload.
    #[must_use]
    pub const fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Returns when the activity was recorded.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
