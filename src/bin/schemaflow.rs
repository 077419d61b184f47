//! Runs the schemaflow dispatch, schema sync and backup loops.
//!
//! Settings come from the environment (see [`schemaflow::config`]); a
//! `.env` file in the working directory is loaded first when present. The
//! process runs until SIGINT or SIGTERM, then stops dispatching and gives
//! running tasks the configured grace period.

use mockable::DefaultClock;
use schemaflow::{
    backup::{BackupStorage, StorageError},
    config::{ConfigError, Settings},
    executor::{ExecutorRegistry, RegistryError},
    instance::{
        adapters::{mysql::MySqlDriver, postgres::PostgresMetadataCatalog},
        ports::{InstanceDriver, MetadataCatalog},
    },
    pg,
    pipeline::{
        adapters::postgres::{PostgresActivitySink, PostgresPipelineRepository},
        services::{SchedulerError, SchedulerOptions, TaskScheduler},
    },
    runtime::{BackupRunner, Runtime, SchemaSyncer},
    telemetry,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
enum StartupError {
    #[error("failed to load .env: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to install tracing subscriber: {0}")]
    Telemetry(#[from] tracing_subscriber::util::TryInitError),
    #[error("failed to build metadata store pool: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(err) if err.not_found() => {}
        Err(err) => return Err(err.into()),
    }
    let settings = Settings::from_env()?;
    telemetry::init(settings.log_format)?;

    let pool = pg::build_pool(&settings.database_url, settings.pool_size)?;
    let clock = Arc::new(DefaultClock);
    let catalog = Arc::new(PostgresMetadataCatalog::new(pool.clone()));
    let driver = Arc::new(MySqlDriver::new(settings.sync_timeout));
    let storage = BackupStorage::open(settings.backup_dir.clone())?;

    let executor_catalog: Arc<dyn MetadataCatalog> = catalog.clone();
    let executor_driver: Arc<dyn InstanceDriver> = driver.clone();
    let registry = ExecutorRegistry::standard(&executor_catalog, &executor_driver, &storage)?;

    let scheduler = TaskScheduler::new(
        Arc::new(PostgresPipelineRepository::new(pool.clone())),
        Arc::new(PostgresActivitySink::new(pool)),
        Arc::clone(&clock),
        Arc::new(registry),
        SchedulerOptions {
            max_concurrent_tasks: settings.max_concurrent_tasks,
            ..SchedulerOptions::default()
        },
    );
    let recovered = scheduler.recover_interrupted().await?;
    if recovered > 0 {
        warn!(recovered, "marked tasks interrupted by the previous run as failed");
    }

    let syncer = SchemaSyncer::new(
        Arc::clone(&catalog),
        driver,
        Arc::clone(&clock),
        settings.sync_timeout,
    );
    let backups = BackupRunner::new(scheduler.clone(), catalog, clock);
    let runtime = Runtime::start(scheduler, syncer, backups, settings.runtime_options());
    info!(backup_dir = %storage.root_path(), "schemaflow running");

    shutdown_signal().await?;
    runtime.shutdown().await;
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("received SIGINT, shutting down");
            }
            _ = terminate.recv() => info!("received SIGTERM, shutting down"),
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("received Ctrl-C, shutting down");
        Ok(())
    }
}
