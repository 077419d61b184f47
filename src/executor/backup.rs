//! Executor for logical backups.

use super::{
    ExecutionContext, ExecutionOutput, TaskExecutor,
    target::{payload_mismatch, resolve_instance, resolve_required_database},
};
use crate::backup::BackupStorage;
use crate::instance::ports::{InstanceDriver, MetadataCatalog};
use crate::pipeline::domain::{ExecutionError, Task, TaskPayload, TaskResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Dumps a database and publishes the dump as `<database>/<backup>.sql`.
#[derive(Clone)]
pub struct DatabaseBackupExecutor {
    catalog: Arc<dyn MetadataCatalog>,
    driver: Arc<dyn InstanceDriver>,
    storage: BackupStorage,
}

impl DatabaseBackupExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn MetadataCatalog>,
        driver: Arc<dyn InstanceDriver>,
        storage: BackupStorage,
    ) -> Self {
        Self {
            catalog,
            driver,
            storage,
        }
    }
}

fn artifact_path(database: &str, backup_name: &str) -> String {
    format!("{database}/{backup_name}.sql")
}

fn validate_backup_name(backup_name: &str) -> Result<(), ExecutionError> {
    let invalid = backup_name.trim().is_empty()
        || backup_name.contains(['/', '\\'])
        || backup_name.starts_with('.');
    if invalid {
        return Err(ExecutionError::invalid_payload(format!(
            "invalid backup name {backup_name:?}"
        )));
    }
    Ok(())
}

#[async_trait]
impl TaskExecutor for DatabaseBackupExecutor {
    async fn run(
        &self,
        ctx: &ExecutionContext,
        task: &Task,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let TaskPayload::DatabaseBackup { backup_name } = task.payload() else {
            return Err(payload_mismatch(task));
        };
        validate_backup_name(backup_name)?;
        let instance = resolve_instance(self.catalog.as_ref(), task).await?;
        let database = resolve_required_database(self.catalog.as_ref(), task).await?;
        ctx.ensure_active()?;

        let dump = self.driver.dump_database(&instance, database.name()).await?;
        ctx.ensure_active()?;
        let path = artifact_path(database.name(), backup_name);
        let bytes = dump.len();
        self.storage.publish(&path, dump).await?;
        info!(task_id = %task.id(), artifact = %path, bytes, "backup published");

        Ok(ExecutionOutput::new(
            TaskResult::detail(format!(
                "backup {backup_name} of {} written",
                database.name()
            ))
            .with_artifact(path),
        ))
    }
}
