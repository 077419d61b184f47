//! Executor for database creation.

use super::{
    ExecutionContext, ExecutionOutput, TaskExecutor,
    target::{payload_mismatch, resolve_instance},
};
use crate::instance::{
    domain::DatabaseDefinition,
    ports::{InstanceDriver, MetadataCatalog},
};
use crate::pipeline::domain::{ExecutionError, Task, TaskPayload, TaskResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Creates a database on the task's instance.
///
/// An existing database whose settings satisfy the request counts as
/// success, so a resubmitted task does not fail on its own earlier work.
#[derive(Clone)]
pub struct DatabaseCreateExecutor {
    catalog: Arc<dyn MetadataCatalog>,
    driver: Arc<dyn InstanceDriver>,
}

impl DatabaseCreateExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(catalog: Arc<dyn MetadataCatalog>, driver: Arc<dyn InstanceDriver>) -> Self {
        Self { catalog, driver }
    }
}

#[async_trait]
impl TaskExecutor for DatabaseCreateExecutor {
    async fn run(
        &self,
        ctx: &ExecutionContext,
        task: &Task,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let TaskPayload::DatabaseCreate {
            database_name,
            character_set,
            collation,
        } = task.payload()
        else {
            return Err(payload_mismatch(task));
        };
        let definition = DatabaseDefinition::new(
            database_name.as_str(),
            character_set.clone(),
            collation.clone(),
        )
        .map_err(|err| ExecutionError::invalid_payload(err.to_string()))?;
        let instance = resolve_instance(self.catalog.as_ref(), task).await?;
        ctx.ensure_active()?;

        if let Some(existing) = self
            .driver
            .database_definition(&instance, definition.name())
            .await?
        {
            if definition.is_satisfied_by(&existing) {
                info!(
                    task_id = %task.id(),
                    database = definition.name(),
                    "database already exists"
                );
                return Ok(ExecutionOutput::new(TaskResult::detail(format!(
                    "database {} already exists",
                    definition.name()
                ))));
            }
            return Err(ExecutionError::invalid_payload(format!(
                "database {} already exists with character set {:?} and collation {:?}",
                existing.name(),
                existing.character_set(),
                existing.collation()
            )));
        }

        self.driver.create_database(&instance, &definition).await?;
        let verification = self
            .driver
            .connect(&instance, Some(definition.name()))
            .await?;
        drop(verification);
        info!(task_id = %task.id(), database = definition.name(), "created database");
        Ok(ExecutionOutput::new(TaskResult::detail(format!(
            "created database {}",
            definition.name()
        ))))
    }
}
