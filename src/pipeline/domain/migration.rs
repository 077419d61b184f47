//! Migration history ledger entries.

use super::{IssueRef, ParseMigrationError, TaskId};
use crate::instance::domain::InstanceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Which tool drove a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationEngine {
    /// Applied through a pipeline task.
    Bytebase,
    /// Applied from a version-control push.
    Vcs,
}

impl MigrationEngine {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bytebase => "BYTEBASE",
            Self::Vcs => "VCS",
        }
    }
}

impl TryFrom<&str> for MigrationEngine {
    type Error = ParseMigrationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BYTEBASE" => Ok(Self::Bytebase),
            "VCS" => Ok(Self::Vcs),
            _ => Err(ParseMigrationError {
                kind: "engine",
                value: value.to_owned(),
            }),
        }
    }
}

impl fmt::Display for MigrationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of schema change applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationType {
    /// Establishes the starting schema, for example a restore.
    Baseline,
    /// Incremental schema change.
    Migrate,
    /// Change applied on a branch database.
    Branch,
}

impl MigrationType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "BASELINE",
            Self::Migrate => "MIGRATE",
            Self::Branch => "BRANCH",
        }
    }
}

impl TryFrom<&str> for MigrationType {
    type Error = ParseMigrationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BASELINE" => Ok(Self::Baseline),
            "MIGRATE" => Ok(Self::Migrate),
            "BRANCH" => Ok(Self::Branch),
            _ => Err(ParseMigrationError {
                kind: "type",
                value: value.to_owned(),
            }),
        }
    }
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Migration details reported by an executor after applying a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Database the script ran against.
    pub database_name: String,
    /// Tool that drove the change.
    pub engine: MigrationEngine,
    /// Kind of change.
    pub migration_type: MigrationType,
    /// Caller-declared version string.
    pub version: String,
    /// Free-form description.
    pub description: String,
    /// Exact statement text that was executed.
    pub statement: String,
    /// Wall-clock execution time.
    pub execution_duration: Duration,
    /// Extra structured details, such as the rollback statement.
    pub payload: serde_json::Value,
}

/// History entry ready to be appended to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMigrationHistory {
    /// Task that applied the change.
    pub task_id: TaskId,
    /// Instance hosting the database.
    pub instance_id: InstanceId,
    /// Issue the change belongs to, if any.
    pub issue: Option<IssueRef>,
    /// Migration details.
    pub record: MigrationRecord,
    /// When the change finished.
    pub created_at: DateTime<Utc>,
}

/// Append-only record of one applied schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationHistory {
    /// Ledger entry identifier.
    pub id: Uuid,
    /// One-based position in the per-database ledger.
    pub sequence: u64,
    /// Task that applied the change.
    pub task_id: TaskId,
    /// Instance hosting the database.
    pub instance_id: InstanceId,
    /// Database the change was applied to.
    pub database: String,
    /// Issue the change belongs to, if any.
    pub issue_id: Option<IssueRef>,
    /// Tool that drove the change.
    pub engine: MigrationEngine,
    /// Kind of change.
    #[serde(rename = "type")]
    pub migration_type: MigrationType,
    /// Caller-declared version string.
    pub version: String,
    /// Free-form description.
    pub description: String,
    /// Exact statement text that was executed.
    pub statement: String,
    /// Execution time in milliseconds.
    pub execution_duration_ms: u64,
    /// Extra structured details.
    pub payload: serde_json::Value,
    /// When the entry was appended.
    pub created_at: DateTime<Utc>,
}

impl MigrationHistory {
    /// Materializes a ledger entry at the given sequence position.
    #[must_use]
    pub fn from_new(entry: NewMigrationHistory, sequence: u64) -> Self {
        let NewMigrationHistory {
            task_id,
            instance_id,
            issue,
            record,
            created_at,
        } = entry;
        Self {
            id: Uuid::new_v4(),
            sequence,
            task_id,
            instance_id,
            database: record.database_name,
            issue_id: issue,
            engine: record.engine,
            migration_type: record.migration_type,
            version: record.version,
            description: record.description,
            statement: record.statement,
            execution_duration_ms: u64::try_from(record.execution_duration.as_millis())
                .unwrap_or(u64::MAX),
            payload: record.payload,
            created_at,
        }
    }
}
