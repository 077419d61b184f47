//! Catalog port for instances, databases, and cached table metadata.

use crate::instance::domain::{Database, DatabaseId, Instance, InstanceId, InstanceSchema, Table};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Metadata store for instances and what they contain.
///
/// Table metadata and sync status are written only through
/// [`MetadataCatalog::apply_sync`] and
/// [`MetadataCatalog::record_sync_failure`].
#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    /// Registers an instance.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DuplicateInstance`] when the ID is taken.
    async fn register_instance(&self, instance: &Instance) -> CatalogResult<()>;

    /// Registers a database on a known instance.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InstanceNotFound`] for an unknown instance or
    /// [`CatalogError::DuplicateDatabase`] when the instance already has a
    /// database with the same name.
    async fn register_database(&self, database: &Database) -> CatalogResult<()>;

    /// Returns every registered instance.
    async fn list_instances(&self) -> CatalogResult<Vec<Instance>>;

    /// Finds an instance by identifier.
    async fn find_instance(&self, id: InstanceId) -> CatalogResult<Option<Instance>>;

    /// Finds a database by identifier.
    async fn find_database(&self, id: DatabaseId) -> CatalogResult<Option<Database>>;

    /// Returns the databases recorded for an instance, in name order.
    async fn list_databases(&self, instance_id: InstanceId) -> CatalogResult<Vec<Database>>;

    /// Returns databases that carry a backup policy.
    async fn list_backup_enabled_databases(&self) -> CatalogResult<Vec<Database>>;

    /// Returns cached tables for a database, in name order.
    async fn list_tables(&self, database_id: DatabaseId) -> CatalogResult<Vec<Table>>;

    /// Replaces cached metadata for one instance with a fresh snapshot.
    ///
    /// Databases in the snapshot are upserted and marked synced. Recorded
    /// databases absent from the snapshot are marked not found. Tables of
    /// every database in the snapshot are replaced.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InstanceNotFound`] for an unknown instance.
    async fn apply_sync(
        &self,
        instance_id: InstanceId,
        schema: &InstanceSchema,
        synced_at: DateTime<Utc>,
    ) -> CatalogResult<()>;

    /// Records a failed sync attempt without touching cached metadata.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InstanceNotFound`] for an unknown instance.
    async fn record_sync_failure(
        &self,
        instance_id: InstanceId,
        error: &str,
        attempted_at: DateTime<Utc>,
    ) -> CatalogResult<()>;
}

/// Errors returned by catalog implementations.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// An instance with the same identifier already exists.
    #[error("duplicate instance identifier: {0}")]
    DuplicateInstance(InstanceId),

    /// The instance already has a database with this name.
    #[error("instance {instance_id} already has a database named {name}")]
    DuplicateDatabase {
        /// Owning instance.
        instance_id: InstanceId,
        /// Conflicting database name.
        name: String,
    },

    /// The instance does not exist.
    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl CatalogError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
