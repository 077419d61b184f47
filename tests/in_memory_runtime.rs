//! End-to-end runs of the scheduler, executors and background loops against
//! the in-memory adapters.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use eyre::{Result, ensure, eyre};
use mockable::DefaultClock;
use schemaflow::backup::BackupStorage;
use schemaflow::executor::ExecutorRegistry;
use schemaflow::instance::{
    adapters::memory::{InMemoryDriver, InMemoryMetadataCatalog, InstanceBehaviour},
    domain::{
        ConnectionInfo, Database, DatabaseDefinition, DatabaseSchema, Engine, EnvironmentName,
        Instance, InstanceSchema,
    },
    ports::{InstanceDriver, MetadataCatalog},
};
use schemaflow::pipeline::{
    adapters::memory::{InMemoryActivitySink, InMemoryPipelineRepository},
    domain::{
        ExecutionErrorKind, MigrationType, Pipeline, PipelineSpec, PipelineStatus,
        RestoreSource, SchemaUpdatePayload, StageSpec, Task, TaskPayload, TaskSpec, TaskStatus,
    },
    services::{SchedulerOptions, TaskScheduler},
};
use schemaflow::runtime::{BackupRunner, Runtime, RuntimeOptions, SchemaSyncer};
use tempfile::TempDir;

type Scheduler = TaskScheduler<InMemoryPipelineRepository, InMemoryActivitySink, DefaultClock>;

struct Fleet {
    catalog: Arc<InMemoryMetadataCatalog>,
    driver: Arc<InMemoryDriver>,
    scheduler: Scheduler,
    instance: Instance,
    shop: Database,
    _backups: TempDir,
}

impl Fleet {
    async fn new() -> Result<Self> {
        let backups = tempfile::tempdir()?;
        let storage =
            BackupStorage::open(Utf8PathBuf::try_from(backups.path().to_path_buf())?)?;
        let catalog = Arc::new(InMemoryMetadataCatalog::new());
        let driver = Arc::new(InMemoryDriver::new());
        let instance = Instance::new(
            "primary",
            EnvironmentName::new("prod")?,
            Engine::MySql,
            ConnectionInfo::new("db.internal", 3306, "admin", "secret")?,
        );
        let definition = DatabaseDefinition::new("shop", Some("utf8mb4".to_owned()), None)?;
        let shop = Database::new(instance.id(), definition.clone());
        catalog.register_instance(&instance).await?;
        catalog.register_database(&shop).await?;
        driver.add_database(instance.id(), definition)?;

        let dyn_catalog: Arc<dyn MetadataCatalog> = catalog.clone();
        let dyn_driver: Arc<dyn InstanceDriver> = driver.clone();
        let registry = ExecutorRegistry::standard(&dyn_catalog, &dyn_driver, &storage)?;
        let scheduler = TaskScheduler::new(
            Arc::new(InMemoryPipelineRepository::new()),
            Arc::new(InMemoryActivitySink::new()),
            Arc::new(DefaultClock),
            Arc::new(registry),
            SchedulerOptions::default(),
        );
        Ok(Self {
            catalog,
            driver,
            scheduler,
            instance,
            shop,
            _backups: backups,
        })
    }

    fn backup_runner(
        &self,
    ) -> BackupRunner<
        InMemoryPipelineRepository,
        InMemoryActivitySink,
        DefaultClock,
        InMemoryMetadataCatalog,
    > {
        BackupRunner::new(
            self.scheduler.clone(),
            Arc::clone(&self.catalog),
            Arc::new(DefaultClock),
        )
    }

    fn single_task(
        &self,
        name: &str,
        database: Option<&Database>,
        payload: TaskPayload,
    ) -> PipelineSpec {
        PipelineSpec {
            name: name.to_owned(),
            issue: None,
            stages: vec![StageSpec {
                name: "Prod".to_owned(),
                environment: self.instance.environment().clone(),
                tasks: vec![TaskSpec {
                    name: name.to_owned(),
                    instance_id: self.instance.id(),
                    database_id: database.map(Database::id),
                    payload,
                }],
            }],
        }
    }

    async fn reload(&self, pipeline: &Pipeline) -> Result<Pipeline> {
        self.scheduler
            .get_pipeline(pipeline.id())
            .await?
            .ok_or_else(|| eyre!("pipeline {} missing", pipeline.id()))
    }

    async fn first_task(&self, pipeline: &Pipeline) -> Result<Task> {
        self.reload(pipeline)
            .await?
            .tasks()
            .next()
            .cloned()
            .ok_or_else(|| eyre!("pipeline {} has no tasks", pipeline.id()))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn backup_then_restore_into_new_database() -> Result<()> {
    let fleet = Fleet::new().await?;
    fleet.driver.set_behaviour(
        fleet.instance.id(),
        InstanceBehaviour {
            dump: Some(
                "-- shop dump\nCREATE TABLE orders (id INT);\nDELIMITER ;;\n\
                 CREATE TRIGGER stamp BEFORE INSERT ON orders FOR EACH ROW BEGIN\n\
                 SET NEW.id = 1;\nEND ;;\nDELIMITER ;\n"
                    .to_owned(),
            ),
            ..InstanceBehaviour::default()
        },
    )?;

    let backup = fleet.backup_runner().trigger_backup(fleet.shop.id()).await?;
    fleet.scheduler.run_until_quiescent().await?;
    let backup_task = fleet.first_task(&backup).await?;
    ensure!(
        backup_task.status() == TaskStatus::Done,
        "backup finished as {}",
        backup_task.status()
    );
    let artifact = backup_task
        .result()
        .and_then(|result| result.artifact.clone())
        .ok_or_else(|| eyre!("backup produced no artifact"))?;

    let restore = fleet
        .scheduler
        .submit_pipeline(fleet.single_task(
            "restore shop_copy",
            None,
            TaskPayload::DatabaseRestore {
                source: RestoreSource::Artifact { path: artifact },
                database_name: "shop_copy".to_owned(),
                version: "restore-1".to_owned(),
            },
        ))
        .await?;
    fleet.scheduler.run_until_quiescent().await?;

    assert_eq!(fleet.reload(&restore).await?.status(), PipelineStatus::Done);
    let replayed: Vec<String> = fleet
        .driver
        .executed_statements()?
        .into_iter()
        .filter(|executed| executed.database.as_deref() == Some("shop_copy"))
        .map(|executed| executed.statement)
        .collect();
    assert_eq!(
        replayed,
        vec![
            "CREATE TABLE orders (id INT);\n".to_owned(),
            "CREATE TRIGGER stamp BEFORE INSERT ON orders FOR EACH ROW BEGIN\n\
             SET NEW.id = 1;\nEND ;;\n"
                .to_owned(),
        ]
    );

    let history = fleet
        .scheduler
        .list_migration_history(fleet.instance.id(), "shop_copy")
        .await?;
    let [baseline] = history.as_slice() else {
        return Err(eyre!("expected one baseline entry, got {}", history.len()));
    };
    assert_eq!(baseline.migration_type, MigrationType::Baseline);
    assert_eq!(baseline.version, "restore-1");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn runtime_loops_dispatch_and_sync_until_shutdown() -> Result<()> {
    let fleet = Fleet::new().await?;
    fleet.driver.set_behaviour(
        fleet.instance.id(),
        InstanceBehaviour {
            schema: InstanceSchema {
                databases: vec![DatabaseSchema {
                    name: "shop".to_owned(),
                    character_set: Some("utf8mb4".to_owned()),
                    collation: None,
                    tables: Vec::new(),
                }],
            },
            ..InstanceBehaviour::default()
        },
    )?;
    let syncer = SchemaSyncer::new(
        Arc::clone(&fleet.catalog),
        Arc::clone(&fleet.driver),
        Arc::new(DefaultClock),
        Duration::from_secs(1),
    );
    let runtime = Runtime::start(
        fleet.scheduler.clone(),
        syncer,
        fleet.backup_runner(),
        RuntimeOptions {
            dispatch_interval: Duration::from_millis(20),
            sync_interval: Duration::from_millis(20),
            backup_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(1),
        },
    );

    let pipeline = fleet
        .scheduler
        .submit_pipeline(fleet.single_task("noop", None, TaskPayload::General))
        .await?;
    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let synced = fleet
                .catalog
                .find_instance(fleet.instance.id())
                .await?
                .and_then(|stored| stored.sync_state().last_successful_sync_at)
                .is_some();
            if synced && fleet.reload(&pipeline).await?.status() == PipelineStatus::Done {
                return Ok::<_, eyre::Report>(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    runtime.shutdown().await;

    finished??;
    assert_eq!(fleet.scheduler.running_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_grace_runs_while_a_sync_cycle_is_still_finishing() -> Result<()> {
    let fleet = Fleet::new().await?;
    fleet.driver.set_behaviour(
        fleet.instance.id(),
        InstanceBehaviour {
            fetch_delay: Some(Duration::from_secs(30)),
            statement_delay: Some(Duration::from_secs(30)),
            ..InstanceBehaviour::default()
        },
    )?;
    let syncer = SchemaSyncer::new(
        Arc::clone(&fleet.catalog),
        Arc::clone(&fleet.driver),
        Arc::new(DefaultClock),
        Duration::from_secs(3),
    );
    let runtime = Runtime::start(
        fleet.scheduler.clone(),
        syncer,
        fleet.backup_runner(),
        RuntimeOptions {
            dispatch_interval: Duration::from_millis(20),
            sync_interval: Duration::from_millis(20),
            backup_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_millis(100),
        },
    );

    let pipeline = fleet
        .scheduler
        .submit_pipeline(fleet.single_task(
            "slow migration",
            Some(&fleet.shop),
            TaskPayload::DatabaseSchemaUpdate(SchemaUpdatePayload {
                statement: "ALTER TABLE orders ADD COLUMN note TEXT;".to_owned(),
                rollback_statement: None,
                version: "v1".to_owned(),
                description: "slow migration".to_owned(),
                migration_type: MigrationType::Migrate,
            }),
        ))
        .await?;
    tokio::time::timeout(Duration::from_secs(2), async {
        while fleet.first_task(&pipeline).await?.status() != TaskStatus::Running {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok::<_, eyre::Report>(())
    })
    .await??;

    let stopping = tokio::spawn(runtime.shutdown());
    let interrupted: Task = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let task = fleet.first_task(&pipeline).await?;
            if task.status() != TaskStatus::Running {
                return Ok::<_, eyre::Report>(task);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await??;
    ensure!(!stopping.is_finished(), "sync cycle should still be running");

    assert_eq!(interrupted.status(), TaskStatus::Failed);
    assert_eq!(
        interrupted.error().map(|error| error.kind()),
        Some(ExecutionErrorKind::Interrupted)
    );
    tokio::time::timeout(Duration::from_secs(5), stopping).await??;
    assert_eq!(fleet.scheduler.running_count(), 0);
    Ok(())
}
