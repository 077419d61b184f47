//! Mapping from task type to executor, validated once at startup.

use super::{
    DatabaseBackupExecutor, DatabaseCreateExecutor, DatabaseRestoreExecutor,
    DatabaseSchemaUpdateExecutor, GeneralExecutor, TaskExecutor,
};
use crate::backup::BackupStorage;
use crate::instance::ports::{InstanceDriver, MetadataCatalog};
use crate::pipeline::domain::TaskType;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Configuration errors raised while assembling the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A task type has no executor.
    #[error("no executor registered for task type {0}")]
    MissingExecutor(TaskType),

    /// A task type was registered twice.
    #[error("executor for task type {0} registered more than once")]
    DuplicateExecutor(TaskType),
}

/// Collects executors before validation.
#[derive(Default)]
pub struct ExecutorRegistryBuilder {
    executors: HashMap<TaskType, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistryBuilder {
    /// Registers the executor for one task type.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateExecutor`] when the type already has
    /// an executor.
    pub fn register(
        mut self,
        task_type: TaskType,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<Self, RegistryError> {
        if self.executors.contains_key(&task_type) {
            return Err(RegistryError::DuplicateExecutor(task_type));
        }
        self.executors.insert(task_type, executor);
        Ok(self)
    }

    /// Validates that every task type is covered.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MissingExecutor`] for the first task type
    /// without an executor.
    pub fn build(mut self) -> Result<ExecutorRegistry, RegistryError> {
        let mut take = |task_type: TaskType| {
            self.executors
                .remove(&task_type)
                .ok_or(RegistryError::MissingExecutor(task_type))
        };
        Ok(ExecutorRegistry {
            general: take(TaskType::General)?,
            database_create: take(TaskType::DatabaseCreate)?,
            schema_update: take(TaskType::DatabaseSchemaUpdate)?,
            backup: take(TaskType::DatabaseBackup)?,
            restore: take(TaskType::DatabaseRestore)?,
        })
    }
}

impl fmt::Debug for ExecutorRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut registered: Vec<_> = self.executors.keys().collect();
        registered.sort();
        f.debug_struct("ExecutorRegistryBuilder")
            .field("registered", &registered)
            .finish()
    }
}

/// Complete mapping from task type to executor.
#[derive(Clone)]
pub struct ExecutorRegistry {
    general: Arc<dyn TaskExecutor>,
    database_create: Arc<dyn TaskExecutor>,
    schema_update: Arc<dyn TaskExecutor>,
    backup: Arc<dyn TaskExecutor>,
    restore: Arc<dyn TaskExecutor>,
}

impl ExecutorRegistry {
    /// Starts an empty registry.
    #[must_use]
    pub fn builder() -> ExecutorRegistryBuilder {
        ExecutorRegistryBuilder::default()
    }

    /// Builds a registry holding the built-in executor for every task type.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when a task type is left uncovered.
    pub fn standard(
        catalog: &Arc<dyn MetadataCatalog>,
        driver: &Arc<dyn InstanceDriver>,
        storage: &BackupStorage,
    ) -> Result<Self, RegistryError> {
        Self::builder()
            .register(TaskType::General, Arc::new(GeneralExecutor))?
            .register(
                TaskType::DatabaseCreate,
                Arc::new(DatabaseCreateExecutor::new(
                    Arc::clone(catalog),
                    Arc::clone(driver),
                )),
            )?
            .register(
                TaskType::DatabaseSchemaUpdate,
                Arc::new(DatabaseSchemaUpdateExecutor::new(
                    Arc::clone(catalog),
                    Arc::clone(driver),
                )),
            )?
            .register(
                TaskType::DatabaseBackup,
                Arc::new(DatabaseBackupExecutor::new(
                    Arc::clone(catalog),
                    Arc::clone(driver),
                    storage.clone(),
                )),
            )?
            .register(
                TaskType::DatabaseRestore,
                Arc::new(DatabaseRestoreExecutor::new(
                    Arc::clone(catalog),
                    Arc::clone(driver),
                    storage.clone(),
                )),
            )?
            .build()
    }

    /// Returns the executor for a task type.
    #[must_use]
    pub fn executor_for(&self, task_type: TaskType) -> Arc<dyn TaskExecutor> {
        let executor = match task_type {
            TaskType::General => &self.general,
            TaskType::DatabaseCreate => &self.database_create,
            TaskType::DatabaseSchemaUpdate => &self.schema_update,
            TaskType::DatabaseBackup => &self.backup,
            TaskType::DatabaseRestore => &self.restore,
        };
        Arc::clone(executor)
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry").finish_non_exhaustive()
    }
}
