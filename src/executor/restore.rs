//! Executor for restores from a backup artifact or inline script.

use super::{
    ExecutionContext, ExecutionOutput, TaskExecutor,
    target::{payload_mismatch, resolve_database, resolve_instance},
};
use crate::backup::BackupStorage;
use crate::instance::{
    domain::DatabaseDefinition,
    ports::{InstanceDriver, MetadataCatalog},
};
use crate::pipeline::domain::{
    ExecutionError, MigrationEngine, MigrationRecord, MigrationType, RestoreSource, Task,
    TaskPayload, TaskResult,
};
use crate::script::replay_script;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

/// Replays a script into a database, creating the database when missing.
///
/// The restored state is recorded as a baseline migration.
#[derive(Clone)]
pub struct DatabaseRestoreExecutor {
    catalog: Arc<dyn MetadataCatalog>,
    driver: Arc<dyn InstanceDriver>,
    storage: BackupStorage,
}

impl DatabaseRestoreExecutor {
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

    async fn load(&self, source: &RestoreSource) -> Result<String, ExecutionError> {
        match source {
            RestoreSource::Artifact { path } => Ok(self.storage.read(path).await?),
            RestoreSource::Script { statement } => Ok(statement.clone()),
        }
    }
}

#[async_trait]
impl TaskExecutor for DatabaseRestoreExecutor {
    async fn run(
        &self,
        ctx: &ExecutionContext,
        task: &Task,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let TaskPayload::DatabaseRestore {
            source,
            database_name,
            version,
        } = task.payload()
        else {
            return Err(payload_mismatch(task));
        };
        let definition = DatabaseDefinition::new(database_name.as_str(), None, None)
            .map_err(|err| ExecutionError::invalid_payload(err.to_string()))?;
        let instance = resolve_instance(self.catalog.as_ref(), task).await?;
        let declared = resolve_database(self.catalog.as_ref(), task).await?;
        if let Some(database) = declared.filter(|database| database.name() != definition.name()) {
            return Err(ExecutionError::invalid_payload(format!(
                "task targets database {} but restores into {}",
                database.name(),
                definition.name()
            )));
        }
        let script = self.load(source).await?;
        ctx.ensure_active()?;

        if self
            .driver
            .database_definition(&instance, definition.name())
            .await?
            .is_none()
        {
            self.driver.create_database(&instance, &definition).await?;
            info!(task_id = %task.id(), database = definition.name(), "created restore target");
        }

        let mut connection = self
            .driver
            .connect(&instance, Some(definition.name()))
            .await?;
        let started = Instant::now();
        let report = replay_script(&script, connection.as_mut(), ctx.cancellation()).await?;
        let execution_duration = started.elapsed();
        info!(
            task_id = %task.id(),
            database = definition.name(),
            statements = report.statements_executed,
            "restore replayed"
        );

        let (description, artifact) = match source {
            RestoreSource::Artifact { path } => {
                (format!("Restore from backup {path}"), Some(path.clone()))
            }
            RestoreSource::Script { .. } => ("Restore from script".to_owned(), None),
        };
        let record = MigrationRecord {
            database_name: definition.name().to_owned(),
            engine: MigrationEngine::Bytebase,
            migration_type: MigrationType::Baseline,
            version: version.clone(),
            description,
            statement: script,
            execution_duration,
            payload: json!({ "source": source }),
        };
        let detail = TaskResult::detail(format!(
            "restored {} statement(s) into {}",
            report.statements_executed,
            definition.name()
        ));
        let result = match artifact {
            Some(path) => detail.with_artifact(path),
            None => detail,
        };
        Ok(ExecutionOutput::new(result).with_migration(record))
    }
}
