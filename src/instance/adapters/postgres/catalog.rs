//! `PostgreSQL` metadata catalog.

use super::{
    models::{DatabaseRow, InstanceRow, TableRow},
    schema::{databases, db_tables, instances},
};
use crate::instance::{
    domain::{
        BackupPolicy, ConnectionInfo, Database, DatabaseDefinition, DatabaseId, Engine,
        EnvironmentName, Instance, InstanceId, InstanceSchema, InstanceSyncState,
        PersistedDatabaseData, SyncStatus, Table, TableMetadata,
    },
    ports::{CatalogError, CatalogResult, MetadataCatalog},
};
use crate::pg::{PgPool, run_blocking};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

/// `PostgreSQL`-backed metadata catalog.
#[derive(Debug, Clone)]
pub struct PostgresMetadataCatalog {
    pool: PgPool,
}

impl PostgresMetadataCatalog {
    /// Creates a catalog from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run<F, T>(&self, f: F) -> CatalogResult<T>
    where
        F: FnOnce(&mut PgConnection) -> CatalogResult<T> + Send + 'static,
        T: Send + 'static,
    {
        run_blocking(&self.pool, CatalogError::persistence, CatalogError::persistence, f).await
    }
}

impl From<DieselError> for CatalogError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

#[async_trait]
impl MetadataCatalog for PostgresMetadataCatalog {
    async fn register_instance(&self, instance: &Instance) -> CatalogResult<()> {
        let instance_id = instance.id();
        let row = to_instance_row(instance)?;
        self.run(move |connection| {
            diesel::insert_into(instances::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        CatalogError::DuplicateInstance(instance_id)
                    }
                    _ => CatalogError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn register_database(&self, database: &Database) -> CatalogResult<()> {
        let instance_id = database.instance_id();
        let name = database.name().to_owned();
        let row = to_database_row(database)?;
        self.run(move |connection| {
            ensure_instance(connection, instance_id)?;
            diesel::insert_into(databases::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        CatalogError::DuplicateDatabase { instance_id, name }
                    }
                    _ => CatalogError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn list_instances(&self) -> CatalogResult<Vec<Instance>> {
        self.run(|connection| {
            instances::table
                .order(instances::name.asc())
                .select(InstanceRow::as_select())
                .load(connection)?
                .into_iter()
                .map(row_to_instance)
                .collect()
        })
        .await
    }

    async fn find_instance(&self, id: InstanceId) -> CatalogResult<Option<Instance>> {
        self.run(move |connection| {
            instances::table
                .find(id.into_inner())
                .select(InstanceRow::as_select())
                .first(connection)
                .optional()?
                .map(row_to_instance)
                .transpose()
        })
        .await
    }

    async fn find_database(&self, id: DatabaseId) -> CatalogResult<Option<Database>> {
        self.run(move |connection| {
            databases::table
                .find(id.into_inner())
                .select(DatabaseRow::as_select())
                .first(connection)
                .optional()?
                .map(row_to_database)
                .transpose()
        })
        .await
    }

    async fn list_databases(&self, instance_id: InstanceId) -> CatalogResult<Vec<Database>> {
        self.run(move |connection| {
            databases::table
                .filter(databases::instance_id.eq(instance_id.into_inner()))
                .order(databases::name.asc())
                .select(DatabaseRow::as_select())
                .load(connection)?
                .into_iter()
                .map(row_to_database)
                .collect()
        })
        .await
    }

    async fn list_backup_enabled_databases(&self) -> CatalogResult<Vec<Database>> {
        self.run(|connection| {
            databases::table
                .filter(databases::backup_period_hours.is_not_null())
                .order(databases::name.asc())
                .select(DatabaseRow::as_select())
                .load(connection)?
                .into_iter()
                .map(row_to_database)
                .collect()
        })
        .await
    }

    async fn list_tables(&self, database_id: DatabaseId) -> CatalogResult<Vec<Table>> {
        self.run(move |connection| {
            db_tables::table
                .filter(db_tables::database_id.eq(database_id.into_inner()))
                .order(db_tables::name.asc())
                .select(TableRow::as_select())
                .load(connection)?
                .into_iter()
                .map(row_to_table)
                .collect()
        })
        .await
    }

    async fn apply_sync(
        &self,
        instance_id: InstanceId,
        schema: &InstanceSchema,
        synced_at: DateTime<Utc>,
    ) -> CatalogResult<()> {
        let snapshot = schema.clone();
        self.run(move |connection| {
            connection.transaction::<_, CatalogError, _>(|conn| {
                ensure_instance(conn, instance_id)?;
                let known = databases::table
                    .filter(databases::instance_id.eq(instance_id.into_inner()))
                    .select(DatabaseRow::as_select())
                    .load(conn)?;

                let mut seen = Vec::with_capacity(snapshot.databases.len());
                for database in snapshot.databases {
                    let existing = known.iter().find(|row| row.name == database.name);
                    let database_id = match existing {
                        Some(row) => {
                            diesel::update(databases::table.find(row.id))
                                .set((
                                    databases::character_set.eq(&database.character_set),
                                    databases::collation.eq(&database.collation),
                                    databases::sync_status.eq(SyncStatus::Ok.as_str()),
                                    databases::last_successful_sync_at.eq(Some(synced_at)),
                                ))
                                .execute(conn)?;
                            row.id
                        }
                        None => {
                            let row = DatabaseRow {
                                id: Uuid::new_v4(),
                                instance_id: instance_id.into_inner(),
                                name: database.name.clone(),
                                character_set: database.character_set.clone(),
                                collation: database.collation.clone(),
                                sync_status: SyncStatus::Ok.as_str().to_owned(),
                                last_successful_sync_at: Some(synced_at),
                                backup_period_hours: None,
                            };
                            diesel::insert_into(databases::table)
                                .values(&row)
                                .execute(conn)?;
                            row.id
                        }
                    };

                    diesel::delete(db_tables::table.filter(db_tables::database_id.eq(database_id)))
                        .execute(conn)?;
                    let table_rows = database
                        .tables
                        .iter()
                        .map(|metadata| to_table_row(database_id, metadata, synced_at))
                        .collect::<CatalogResult<Vec<_>>>()?;
                    if !table_rows.is_empty() {
                        diesel::insert_into(db_tables::table)
                            .values(&table_rows)
                            .execute(conn)?;
                    }
                    seen.push(database_id);
                }

                diesel::update(
                    databases::table
                        .filter(databases::instance_id.eq(instance_id.into_inner()))
                        .filter(databases::id.ne_all(&seen)),
                )
                .set(databases::sync_status.eq(SyncStatus::NotFound.as_str()))
                .execute(conn)?;

                diesel::update(instances::table.find(instance_id.into_inner()))
                    .set((
                        instances::sync_status.eq(Some(SyncStatus::Ok.as_str())),
                        instances::last_sync_attempt_at.eq(Some(synced_at)),
                        instances::last_successful_sync_at.eq(Some(synced_at)),
                        instances::last_sync_error.eq(None::<String>),
                    ))
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn record_sync_failure(
        &self,
        instance_id: InstanceId,
        error: &str,
        attempted_at: DateTime<Utc>,
    ) -> CatalogResult<()> {
        let message = error.to_owned();
        self.run(move |connection| {
            let updated = diesel::update(instances::table.find(instance_id.into_inner()))
                .set((
                    instances::sync_status.eq(Some(SyncStatus::Failed.as_str())),
                    instances::last_sync_attempt_at.eq(Some(attempted_at)),
                    instances::last_sync_error.eq(Some(message)),
                ))
                .execute(connection)?;
            if updated == 0 {
                return Err(CatalogError::InstanceNotFound(instance_id));
            }
            Ok(())
        })
        .await
    }
}

fn ensure_instance(connection: &mut PgConnection, instance_id: InstanceId) -> CatalogResult<()> {
    let found: i64 = instances::table
        .filter(instances::id.eq(instance_id.into_inner()))
        .count()
        .get_result(connection)?;
    if found == 0 {
        return Err(CatalogError::InstanceNotFound(instance_id));
    }
    Ok(())
}

fn to_instance_row(instance: &Instance) -> CatalogResult<InstanceRow> {
    let info = instance.connection();
    let sync = instance.sync_state();
    Ok(InstanceRow {
        id: instance.id().into_inner(),
        name: instance.name().to_owned(),
        environment: instance.environment().as_str().to_owned(),
        engine: instance.engine().as_str().to_owned(),
        host: info.host().to_owned(),
        port: i32::from(info.port()),
        username: info.username().to_owned(),
        password: info.password().to_owned(),
        sync_status: sync.status.map(|status| status.as_str().to_owned()),
        last_sync_attempt_at: sync.last_attempt_at,
        last_successful_sync_at: sync.last_successful_sync_at,
        last_sync_error: sync.last_error.clone(),
    })
}

fn row_to_instance(row: InstanceRow) -> CatalogResult<Instance> {
    let environment = EnvironmentName::new(row.environment).map_err(CatalogError::persistence)?;
    let engine = Engine::try_from(row.engine.as_str()).map_err(CatalogError::persistence)?;
    let port = u16::try_from(row.port).map_err(CatalogError::persistence)?;
    let connection = ConnectionInfo::new(row.host, port, row.username, row.password)
        .map_err(CatalogError::persistence)?;
    let status = row
        .sync_status
        .as_deref()
        .map(SyncStatus::try_from)
        .transpose()
        .map_err(CatalogError::persistence)?;
    Ok(Instance::from_persisted(
        InstanceId::from_uuid(row.id),
        row.name,
        environment,
        engine,
        connection,
        InstanceSyncState {
            status,
            last_attempt_at: row.last_sync_attempt_at,
            last_successful_sync_at: row.last_successful_sync_at,
            last_error: row.last_sync_error,
        },
    ))
}

fn to_database_row(database: &Database) -> CatalogResult<DatabaseRow> {
    let backup_period_hours = database
        .backup_policy()
        .map(|policy| i32::try_from(policy.period_hours()))
        .transpose()
        .map_err(CatalogError::persistence)?;
    Ok(DatabaseRow {
        id: database.id().into_inner(),
        instance_id: database.instance_id().into_inner(),
        name: database.name().to_owned(),
        character_set: database.definition().character_set().map(str::to_owned),
        collation: database.definition().collation().map(str::to_owned),
        sync_status: database.sync_status().as_str().to_owned(),
        last_successful_sync_at: database.last_successful_sync_at(),
        backup_period_hours,
    })
}

fn row_to_database(row: DatabaseRow) -> CatalogResult<Database> {
    let definition = DatabaseDefinition::new(row.name, row.character_set, row.collation)
        .map_err(CatalogError::persistence)?;
    let backup_policy = row
        .backup_period_hours
        .map(|hours| {
            let period = u32::try_from(hours).map_err(CatalogError::persistence)?;
            BackupPolicy::every_hours(period).map_err(CatalogError::persistence)
        })
        .transpose()?;
    Ok(Database::from_persisted(PersistedDatabaseData {
        id: DatabaseId::from_uuid(row.id),
        instance_id: InstanceId::from_uuid(row.instance_id),
        definition,
        sync_status: SyncStatus::try_from(row.sync_status.as_str())
            .map_err(CatalogError::persistence)?,
        last_successful_sync_at: row.last_successful_sync_at,
        backup_policy,
    }))
}

fn to_table_row(
    database_id: Uuid,
    metadata: &TableMetadata,
    synced_at: DateTime<Utc>,
) -> CatalogResult<TableRow> {
    Ok(TableRow {
        database_id,
        name: metadata.name.clone(),
        metadata: serde_json::to_value(metadata).map_err(CatalogError::persistence)?,
        sync_status: SyncStatus::Ok.as_str().to_owned(),
        last_successful_sync_at: synced_at,
    })
}

fn row_to_table(row: TableRow) -> CatalogResult<Table> {
    Ok(Table {
        database_id: DatabaseId::from_uuid(row.database_id),
        metadata: serde_json::from_value(row.metadata).map_err(CatalogError::persistence)?,
        sync_status: SyncStatus::try_from(row.sync_status.as_str())
            .map_err(CatalogError::persistence)?,
        last_successful_sync_at: row.last_successful_sync_at,
    })
}
