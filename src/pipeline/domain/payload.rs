//! Typed task payloads.

use super::{MigrationType, TaskType};
use serde::{Deserialize, Serialize};

/// Parameters of a schema update task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaUpdatePayload {
    /// Script to apply.
    pub statement: String,
    /// Script that reverts the change, stored with the history entry.
    #[serde(default)]
    pub rollback_statement: Option<String>,
    /// Caller-declared version string.
    pub version: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Kind of change.
    pub migration_type: MigrationType,
}

/// Where a restore reads its script from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RestoreSource {
    /// A backup artifact previously written by a backup task.
    Artifact {
        /// Artifact path relative to the backup directory.
        path: String,
    },
    /// An inline script.
    Script {
        /// Script text.
        statement: String,
    },
}

/// Payload carried by a task; the variant determines the task type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    /// No-op task.
    General,
    /// Create a database on the target instance.
    DatabaseCreate {
        /// Name of the new database.
        database_name: String,
        /// Default character set.
        #[serde(default)]
        character_set: Option<String>,
        /// Default collation.
        #[serde(default)]
        collation: Option<String>,
    },
    /// Apply a migration script to the target database.
    DatabaseSchemaUpdate(SchemaUpdatePayload),
    /// Dump the target database to a backup artifact.
    DatabaseBackup {
        /// Name of the backup, used for the artifact file name.
        backup_name: String,
    },
    /// Replay a backup or script into a database on the target instance.
    DatabaseRestore {
        /// Script to replay.
        source: RestoreSource,
        /// Database to restore into; created when missing.
        database_name: String,
        /// Version recorded in the migration history.
        version: String,
    },
}

impl TaskPayload {
    /// Returns the task type this payload belongs to.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        match self {
            Self::General => TaskType::General,
            Self::DatabaseCreate { .. } => TaskType::DatabaseCreate,
            Self::DatabaseSchemaUpdate(_) => TaskType::DatabaseSchemaUpdate,
            Self::DatabaseBackup { .. } => TaskType::DatabaseBackup,
            Self::DatabaseRestore { .. } => TaskType::DatabaseRestore,
        }
    }
}
