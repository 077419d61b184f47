//! Shared world state for pipeline scheduling BDD scenarios.

use std::sync::Arc;

use camino::Utf8PathBuf;
use mockable::DefaultClock;
use rstest::fixture;
use schemaflow::backup::BackupStorage;
use schemaflow::executor::ExecutorRegistry;
use schemaflow::instance::{
    adapters::memory::{InMemoryDriver, InMemoryMetadataCatalog},
    domain::{ConnectionInfo, Database, Engine, EnvironmentName, Instance},
    ports::{InstanceDriver, MetadataCatalog},
};
use schemaflow::pipeline::{
    adapters::memory::{InMemoryActivitySink, InMemoryPipelineRepository},
    domain::{Pipeline, StageSpec, Task},
    services::{SchedulerOptions, TaskScheduler},
};
use tempfile::TempDir;

/// Scheduler type used by the BDD world.
pub type TestScheduler =
    TaskScheduler<InMemoryPipelineRepository, InMemoryActivitySink, DefaultClock>;

/// Scenario world for scheduling behaviour tests.
pub struct SchedulingWorld {
    pub catalog: Arc<InMemoryMetadataCatalog>,
    pub driver: Arc<InMemoryDriver>,
    pub scheduler: TestScheduler,
    pub instance: Instance,
    pub databases: Vec<Database>,
    pub stages: Vec<StageSpec>,
    pub pipeline: Option<Pipeline>,
    _backups: TempDir,
}

impl SchedulingWorld {
    /// Creates a world with one unregistered instance and no pipeline.
    ///
    /// # Panics
    ///
    /// Panics when the scratch backup directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let backups = tempfile::tempdir().expect("create backup directory");
        let root = Utf8PathBuf::try_from(backups.path().to_path_buf()).expect("utf-8 temp path");
        let storage = BackupStorage::open(root).expect("open backup storage");
        let catalog = Arc::new(InMemoryMetadataCatalog::new());
        let driver = Arc::new(InMemoryDriver::new());

        let dyn_catalog: Arc<dyn MetadataCatalog> = catalog.clone();
        let dyn_driver: Arc<dyn InstanceDriver> = driver.clone();
        let registry = ExecutorRegistry::standard(&dyn_catalog, &dyn_driver, &storage)
            .expect("standard executors register once");
        let scheduler = TaskScheduler::new(
            Arc::new(InMemoryPipelineRepository::new()),
            Arc::new(InMemoryActivitySink::new()),
            Arc::new(DefaultClock),
            Arc::new(registry),
            SchedulerOptions::default(),
        );
        let instance = Instance::new(
            "primary",
            EnvironmentName::new("prod").expect("valid environment"),
            Engine::MySql,
            ConnectionInfo::new("db.internal", 3306, "admin", "secret")
                .expect("valid connection"),
        );

        Self {
            catalog,
            driver,
            scheduler,
            instance,
            databases: Vec::new(),
            stages: Vec::new(),
            pipeline: None,
            _backups: backups,
        }
    }

    /// Finds a registered database by name.
    ///
    /// # Errors
    ///
    /// Returns an error when the scenario never registered the database.
    pub fn database(&self, name: &str) -> Result<&Database, eyre::Report> {
        self.databases
            .iter()
            .find(|database| database.name() == name)
            .ok_or_else(|| eyre::eyre!("database {name} is not registered in the scenario"))
    }

    /// Reloads the submitted pipeline from the scheduler.
    ///
    /// # Errors
    ///
    /// Returns an error when no pipeline was submitted or it vanished.
    pub fn reload_pipeline(&self) -> Result<Pipeline, eyre::Report> {
        let submitted = self
            .pipeline
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing submitted pipeline in scenario world"))?;
        run_async(self.scheduler.get_pipeline(submitted.id()))?
            .ok_or_else(|| eyre::eyre!("pipeline {} vanished", submitted.id()))
    }

    /// Finds the first task of a stage that targets a database.
    ///
    /// # Errors
    ///
    /// Returns an error when no such task exists.
    pub fn task_on(&self, database: &str, stage: &str) -> Result<Task, eyre::Report> {
        let database_id = self.database(database)?.id();
        let pipeline = self.reload_pipeline()?;
        pipeline
            .stages()
            .iter()
            .filter(|candidate| candidate.name() == stage)
            .flat_map(|candidate| candidate.tasks())
            .find(|task| task.database_id() == Some(database_id))
            .cloned()
            .ok_or_else(|| eyre::eyre!("no task on {database} in stage {stage}"))
    }
}

impl Default for SchedulingWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> SchedulingWorld {
    SchedulingWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
