//! Task executors and the registry that maps task types onto them.
//!
//! Executors never panic the scheduler: every fault is reported as an
//! [`ExecutionError`](crate::pipeline::domain::ExecutionError). A panic that
//! escapes an executor anyway is caught by the scheduler and recorded as an
//! internal failure.

mod backup;
mod contract;
mod create;
mod error;
mod general;
mod registry;
mod restore;
mod schema_update;
mod target;

pub use backup::DatabaseBackupExecutor;
pub use contract::{ExecutionContext, ExecutionOutput, TaskExecutor};
pub use create::DatabaseCreateExecutor;
pub use general::GeneralExecutor;
pub use registry::{ExecutorRegistry, ExecutorRegistryBuilder, RegistryError};
pub use restore::DatabaseRestoreExecutor;
pub use schema_update::DatabaseSchemaUpdateExecutor;
