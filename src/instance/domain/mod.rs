//! Domain model for instances and their schema metadata.

mod database;
mod error;
mod ids;
mod instance;
mod schema;

pub use database::{BackupPolicy, Database, DatabaseDefinition, PersistedDatabaseData};
pub use error::{InstanceDomainError, ParseEngineError, ParseSyncStatusError};
pub use ids::{DatabaseId, EnvironmentName, InstanceId};
pub use instance::{ConnectionInfo, Engine, Instance, InstanceSyncState, SyncStatus};
pub use schema::{
    ColumnMetadata, DatabaseSchema, IndexMetadata, InstanceSchema, Table, TableMetadata,
};
