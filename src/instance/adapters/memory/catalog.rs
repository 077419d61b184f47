//! In-memory metadata catalog.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::instance::{
    domain::{
        Database, DatabaseDefinition, DatabaseId, Instance, InstanceId, InstanceSchema,
        SyncStatus, Table,
    },
    ports::{CatalogError, CatalogResult, MetadataCatalog},
};

/// Thread-safe in-memory metadata catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadataCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    instances: HashMap<InstanceId, Instance>,
    databases: HashMap<DatabaseId, Database>,
    tables: HashMap<DatabaseId, Vec<Table>>,
}

impl InMemoryMetadataCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> CatalogResult<std::sync::RwLockReadGuard<'_, InMemoryCatalogState>> {
        self.state
            .read()
            .map_err(|err| CatalogError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> CatalogResult<std::sync::RwLockWriteGuard<'_, InMemoryCatalogState>> {
        self.state
            .write()
            .map_err(|err| CatalogError::persistence(std::io::Error::other(err.to_string())))
    }
}

impl InMemoryCatalogState {
    fn databases_of(&self, instance_id: InstanceId) -> Vec<Database> {
        let mut found: Vec<Database> = self
            .databases
            .values()
            .filter(|database| database.instance_id() == instance_id)
            .cloned()
            .collect();
        found.sort_by(|left, right| left.name().cmp(right.name()));
        found
    }
}

#[async_trait]
impl MetadataCatalog for InMemoryMetadataCatalog {
    async fn register_instance(&self, instance: &Instance) -> CatalogResult<()> {
        let mut state = self.write()?;
        if state.instances.contains_key(&instance.id()) {
            return Err(CatalogError::DuplicateInstance(instance.id()));
        }
        state.instances.insert(instance.id(), instance.clone());
        Ok(())
    }

    async fn register_database(&self, database: &Database) -> CatalogResult<()> {
        let mut state = self.write()?;
        if !state.instances.contains_key(&database.instance_id()) {
            return Err(CatalogError::InstanceNotFound(database.instance_id()));
        }
        let name_taken = state.databases.values().any(|existing| {
            existing.instance_id() == database.instance_id() && existing.name() == database.name()
        });
        if name_taken {
            return Err(CatalogError::DuplicateDatabase {
                instance_id: database.instance_id(),
                name: database.name().to_owned(),
            });
        }
        state.databases.insert(database.id(), database.clone());
        Ok(())
    }

    async fn list_instances(&self) -> CatalogResult<Vec<Instance>> {
        let state = self.read()?;
        let mut instances: Vec<Instance> = state.instances.values().cloned().collect();
        instances.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(instances)
    }

    async fn find_instance(&self, id: InstanceId) -> CatalogResult<Option<Instance>> {
        let state = self.read()?;
        Ok(state.instances.get(&id).cloned())
    }

    async fn find_database(&self, id: DatabaseId) -> CatalogResult<Option<Database>> {
        let state = self.read()?;
        Ok(state.databases.get(&id).cloned())
    }

    async fn list_databases(&self, instance_id: InstanceId) -> CatalogResult<Vec<Database>> {
        let state = self.read()?;
        Ok(state.databases_of(instance_id))
    }

    async fn list_backup_enabled_databases(&self) -> CatalogResult<Vec<Database>> {
        let state = self.read()?;
        let mut found: Vec<Database> = state
            .databases
            .values()
            .filter(|database| database.backup_policy().is_some())
            .cloned()
            .collect();
        found.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(found)
    }

    async fn list_tables(&self, database_id: DatabaseId) -> CatalogResult<Vec<Table>> {
        let state = self.read()?;
        Ok(state.tables.get(&database_id).cloned().unwrap_or_default())
    }

    async fn apply_sync(
        &self,
        instance_id: InstanceId,
        schema: &InstanceSchema,
        synced_at: DateTime<Utc>,
    ) -> CatalogResult<()> {
        let mut state = self.write()?;
        if !state.instances.contains_key(&instance_id) {
            return Err(CatalogError::InstanceNotFound(instance_id));
        }

        let mut seen = Vec::with_capacity(schema.databases.len());
        for snapshot in &schema.databases {
            let definition = DatabaseDefinition::new(
                snapshot.name.clone(),
                snapshot.character_set.clone(),
                snapshot.collation.clone(),
            )
            .map_err(CatalogError::persistence)?;

            let existing_id = state
                .databases
                .values()
                .find(|database| {
                    database.instance_id() == instance_id && database.name() == snapshot.name
                })
                .map(Database::id);
            let database_id = match existing_id.and_then(|id| state.databases.get_mut(&id)) {
                Some(database) => {
                    database.mark_synced(definition, synced_at);
                    database.id()
                }
                None => {
                    let mut database = Database::new(instance_id, definition.clone());
                    database.mark_synced(definition, synced_at);
                    let id = database.id();
                    state.databases.insert(id, database);
                    id
                }
            };

            let tables = snapshot
                .tables
                .iter()
                .map(|metadata| Table {
                    database_id,
                    metadata: metadata.clone(),
                    sync_status: SyncStatus::Ok,
                    last_successful_sync_at: synced_at,
                })
                .collect();
            state.tables.insert(database_id, tables);
            seen.push(database_id);
        }

        for database in state.databases.values_mut() {
            if database.instance_id() == instance_id && !seen.contains(&database.id()) {
                database.mark_not_found();
            }
        }

        if let Some(instance) = state.instances.get_mut(&instance_id) {
            instance.mark_synced(synced_at);
        }
        Ok(())
    }

    async fn record_sync_failure(
        &self,
        instance_id: InstanceId,
        error: &str,
        attempted_at: DateTime<Utc>,
    ) -> CatalogResult<()> {
        let mut state = self.write()?;
        let instance = state
            .instances
            .get_mut(&instance_id)
            .ok_or(CatalogError::InstanceNotFound(instance_id))?;
        instance.mark_sync_failed(attempted_at, error);
        Ok(())
    }
}
