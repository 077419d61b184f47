//! Conversions from component errors into task failures.

use crate::backup::StorageError;
use crate::instance::ports::{CatalogError, DriverError};
use crate::pipeline::domain::{ExecutionError, ExecutionErrorKind};
use crate::script::ScriptError;

impl From<ScriptError> for ExecutionError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::Statement { statement, source } => {
                Self::new(ExecutionErrorKind::Statement, source.message()).with_statement(statement)
            }
            ScriptError::Canceled { .. } => {
                Self::new(ExecutionErrorKind::Canceled, err.to_string())
            }
            ScriptError::Read(_) => Self::internal(err.to_string()),
        }
    }
}

impl From<DriverError> for ExecutionError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Connection(_) => {
                Self::new(ExecutionErrorKind::Connectivity, err.to_string())
            }
            DriverError::Query { statement, message } => {
                Self::new(ExecutionErrorKind::Statement, message).with_statement(statement)
            }
        }
    }
}

impl From<CatalogError> for ExecutionError {
    fn from(err: CatalogError) -> Self {
        Self::internal(format!("metadata catalog: {err}"))
    }
}

impl From<StorageError> for ExecutionError {
    fn from(err: StorageError) -> Self {
        Self::new(ExecutionErrorKind::Storage, err.to_string())
    }
}
