//! Executor for migration scripts.

use super::{
    ExecutionContext, ExecutionOutput, TaskExecutor,
    target::{payload_mismatch, resolve_instance, resolve_required_database},
};
use crate::instance::ports::{InstanceDriver, MetadataCatalog};
use crate::pipeline::domain::{
    ExecutionError, MigrationEngine, MigrationRecord, Task, TaskPayload, TaskResult,
};
use crate::script::replay_script;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

/// Replays a task's migration statement against its database.
///
/// Statements already applied when a later one fails stay applied.
#[derive(Clone)]
pub struct DatabaseSchemaUpdateExecutor {
    catalog: Arc<dyn MetadataCatalog>,
    driver: Arc<dyn InstanceDriver>,
}

impl DatabaseSchemaUpdateExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(catalog: Arc<dyn MetadataCatalog>, driver: Arc<dyn InstanceDriver>) -> Self {
        Self { catalog, driver }
    }
}

#[async_trait]
impl TaskExecutor for DatabaseSchemaUpdateExecutor {
    async fn run(
        &self,
        ctx: &ExecutionContext,
        task: &Task,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let TaskPayload::DatabaseSchemaUpdate(payload) = task.payload() else {
            return Err(payload_mismatch(task));
        };
        let instance = resolve_instance(self.catalog.as_ref(), task).await?;
        let database = resolve_required_database(self.catalog.as_ref(), task).await?;
        ctx.ensure_active()?;

        let mut connection = self.driver.connect(&instance, Some(database.name())).await?;
        let started = Instant::now();
        let report =
            replay_script(&payload.statement, connection.as_mut(), ctx.cancellation()).await?;
        let execution_duration = started.elapsed();
        info!(
            task_id = %task.id(),
            database = database.name(),
            version = %payload.version,
            statements = report.statements_executed,
            "applied migration"
        );

        let record = MigrationRecord {
            database_name: database.name().to_owned(),
            engine: MigrationEngine::Bytebase,
            migration_type: payload.migration_type,
            version: payload.version.clone(),
            description: payload.description.clone(),
            statement: payload.statement.clone(),
            execution_duration,
            payload: json!({ "rollbackStatement": payload.rollback_statement }),
        };
        Ok(ExecutionOutput::new(TaskResult::detail(format!(
            "applied {} statement(s) to {}",
            report.statements_executed,
            database.name()
        )))
        .with_migration(record))
    }
}
