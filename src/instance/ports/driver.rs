//! Driver port for talking to live instances.

use crate::instance::domain::{DatabaseDefinition, Instance, InstanceSchema};
use crate::script::ScriptConnection;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Engine-specific access to a running instance.
#[async_trait]
pub trait InstanceDriver: Send + Sync {
    /// Opens a connection, optionally scoped to one database.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Connection`] when the instance is unreachable
    /// or rejects the credentials.
    async fn connect(
        &self,
        instance: &Instance,
        database: Option<&str>,
    ) -> DriverResult<Box<dyn ScriptConnection>>;

    /// Reads the settings of a database, returning `None` when it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Connection`] or [`DriverError::Query`].
    async fn database_definition(
        &self,
        instance: &Instance,
        name: &str,
    ) -> DriverResult<Option<DatabaseDefinition>>;

    /// Creates a database with the requested settings.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Query`] when the server rejects the request.
    async fn create_database(
        &self,
        instance: &Instance,
        definition: &DatabaseDefinition,
    ) -> DriverResult<()>;

    /// Reads a snapshot of every user database on the instance.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Connection`] or [`DriverError::Query`].
    async fn fetch_schema(&self, instance: &Instance) -> DriverResult<InstanceSchema>;

    /// Produces a replayable script recreating one database.
    ///
    /// Compound statements are wrapped in `DELIMITER ;;` blocks.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Connection`] or [`DriverError::Query`].
    async fn dump_database(&self, instance: &Instance, database: &str) -> DriverResult<String>;
}

/// Errors returned by driver implementations.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// The instance could not be reached or refused the login.
    #[error("connect to instance failed: {0}")]
    Connection(Arc<dyn std::error::Error + Send + Sync>),

    /// A statement issued by the driver failed.
    #[error("query {statement:?} failed: {message}")]
    Query {
        /// Statement that failed.
        statement: String,
        /// Server error message.
        message: String,
    },
}

impl DriverError {
    /// Wraps a connection error.
    pub fn connection(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Connection(Arc::new(err))
    }

    /// Builds a query error.
    pub fn query(statement: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Query {
            statement: statement.into(),
            message: err.to_string(),
        }
    }
}
