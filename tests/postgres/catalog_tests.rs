//! Metadata catalog tests against `PostgreSQL`.

use crate::postgres::helpers::{
    TestCluster, TestDatabase, block_on, sample_instance, shared_test_cluster,
};
use chrono::{TimeZone, Utc};
use eyre::{Result, ensure, eyre};
use rstest::rstest;
use schemaflow::instance::adapters::postgres::PostgresMetadataCatalog;
use schemaflow::instance::domain::{
    BackupPolicy, ColumnMetadata, Database, DatabaseDefinition, DatabaseSchema, InstanceSchema,
    SyncStatus, TableMetadata,
};
use schemaflow::instance::ports::{CatalogError, MetadataCatalog};

fn orders_table() -> TableMetadata {
    TableMetadata {
        name: "orders".to_owned(),
        table_type: "BASE TABLE".to_owned(),
        engine: "InnoDB".to_owned(),
        columns: vec![ColumnMetadata {
            name: "id".to_owned(),
            position: 1,
            default: None,
            nullable: false,
            column_type: "int".to_owned(),
            character_set: None,
            collation: None,
            comment: String::new(),
        }],
        ..TableMetadata::default()
    }
}

#[rstest]
fn registering_twice_is_rejected(shared_test_cluster: &'static TestCluster) -> Result<()> {
    let database = TestDatabase::create(shared_test_cluster, "registering_twice_is_r")?;
    block_on(async {
        let catalog = PostgresMetadataCatalog::new(database.pool()?);
        let instance = sample_instance("primary")?;
        catalog.register_instance(&instance).await?;

        let duplicate = catalog.register_instance(&instance).await;
        ensure!(
            matches!(duplicate, Err(CatalogError::DuplicateInstance(id)) if id == instance.id()),
            "expected duplicate instance, got {duplicate:?}"
        );

        let shop = Database::new(instance.id(), DatabaseDefinition::new("shop", None, None)?);
        catalog.register_database(&shop).await?;
        let same_name = Database::new(instance.id(), DatabaseDefinition::new("shop", None, None)?);
        let clash = catalog.register_database(&same_name).await;
        ensure!(
            matches!(
                clash,
                Err(CatalogError::DuplicateDatabase { ref name, .. }) if name == "shop"
            ),
            "expected duplicate database, got {clash:?}"
        );
        Ok(())
    })
}

#[rstest]
fn database_for_unknown_instance_is_rejected(
    shared_test_cluster: &'static TestCluster,
) -> Result<()> {
    let database = TestDatabase::create(shared_test_cluster, "database_for_unknown_i")?;
    block_on(async {
        let catalog = PostgresMetadataCatalog::new(database.pool()?);
        let orphan = sample_instance("orphan")?;
        let database = Database::new(orphan.id(), DatabaseDefinition::new("shop", None, None)?);

        let result = catalog.register_database(&database).await;
        ensure!(
            matches!(result, Err(CatalogError::InstanceNotFound(_))),
            "expected instance not found, got {result:?}"
        );
        Ok(())
    })
}

#[rstest]
fn sync_snapshot_replaces_cached_metadata(shared_test_cluster: &'static TestCluster) -> Result<()> {
    let database = TestDatabase::create(shared_test_cluster, "sync_snapshot_replaces")?;
    block_on(async {
        let catalog = PostgresMetadataCatalog::new(database.pool()?);
        let instance = sample_instance("primary")?;
        catalog.register_instance(&instance).await?;
        let legacy = Database::new(instance.id(), DatabaseDefinition::new("legacy", None, None)?);
        catalog.register_database(&legacy).await?;

        let synced_at = Utc
            .with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
            .single()
            .ok_or_else(|| eyre!("invalid timestamp"))?;
        let snapshot = InstanceSchema {
            databases: vec![DatabaseSchema {
                name: "shop".to_owned(),
                character_set: Some("utf8mb4".to_owned()),
                collation: Some("utf8mb4_general_ci".to_owned()),
                tables: vec![orders_table()],
            }],
        };
        catalog.apply_sync(instance.id(), &snapshot, synced_at).await?;

        let databases = catalog.list_databases(instance.id()).await?;
        let names: Vec<&str> = databases.iter().map(Database::name).collect();
        assert_eq!(names, vec!["legacy", "shop"]);
        let [stale, shop] = databases.as_slice() else {
            return Err(eyre!("expected two databases"));
        };
        assert_eq!(stale.sync_status(), SyncStatus::NotFound);
        assert_eq!(shop.sync_status(), SyncStatus::Ok);
        assert_eq!(shop.last_successful_sync_at(), Some(synced_at));
        assert_eq!(shop.definition().character_set(), Some("utf8mb4"));

        let tables = catalog.list_tables(shop.id()).await?;
        let [orders] = tables.as_slice() else {
            return Err(eyre!("expected one table, got {}", tables.len()));
        };
        assert_eq!(orders.metadata, orders_table());

        let stored = catalog
            .find_instance(instance.id())
            .await?
            .ok_or_else(|| eyre!("instance missing"))?;
        assert_eq!(stored.sync_state().status, Some(SyncStatus::Ok));
        assert_eq!(stored.sync_state().last_successful_sync_at, Some(synced_at));
        Ok(())
    })
}

#[rstest]
fn failed_sync_keeps_cached_metadata(shared_test_cluster: &'static TestCluster) -> Result<()> {
    let database = TestDatabase::create(shared_test_cluster, "failed_sync_keeps_cach")?;
    block_on(async {
        let catalog = PostgresMetadataCatalog::new(database.pool()?);
        let instance = sample_instance("primary")?;
        catalog.register_instance(&instance).await?;
        let shop = Database::new(instance.id(), DatabaseDefinition::new("shop", None, None)?)
            .with_backup_policy(BackupPolicy::every_hours(24)?);
        catalog.register_database(&shop).await?;

        let attempted_at = Utc
            .with_ymd_and_hms(2024, 3, 1, 10, 0, 0)
            .single()
            .ok_or_else(|| eyre!("invalid timestamp"))?;
        catalog
            .record_sync_failure(instance.id(), "connection refused", attempted_at)
            .await?;

        let stored = catalog
            .find_instance(instance.id())
            .await?
            .ok_or_else(|| eyre!("instance missing"))?;
        assert_eq!(stored.sync_state().status, Some(SyncStatus::Failed));
        assert_eq!(stored.sync_state().last_attempt_at, Some(attempted_at));
        assert_eq!(stored.sync_state().last_error.as_deref(), Some("connection refused"));
        assert_eq!(stored.sync_state().last_successful_sync_at, None);

        let backed_up = catalog.list_backup_enabled_databases().await?;
        let ids: Vec<_> = backed_up.iter().map(Database::id).collect();
        assert_eq!(ids, vec![shop.id()]);
        Ok(())
    })
}
