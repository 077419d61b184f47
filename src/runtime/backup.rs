//! Backup runner: enqueues scheduled and ad-hoc backups.

use crate::instance::{
    domain::{Database, DatabaseId, InstanceId},
    ports::{CatalogError, MetadataCatalog},
};
use crate::pipeline::{
    domain::{Pipeline, PipelineId, TaskStatus, TaskType},
    ports::{ActivitySink, PipelineRepository},
    services::{SchedulerError, TaskScheduler},
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Errors raised while enqueueing a backup.
#[derive(Debug, Error)]
pub enum BackupRunnerError {
    /// Catalog lookup failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The scheduler rejected the backup pipeline.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// The database is not in the catalog.
    #[error("database not found: {0}")]
    DatabaseNotFound(DatabaseId),

    /// The database's instance is not in the catalog.
    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),
}

/// Enqueues backups through the scheduler.
pub struct BackupRunner<R, A, C, M>
where
    R: PipelineRepository + 'static,
    A: ActivitySink + 'static,
    C: Clock + Send + Sync + 'static,
    M: MetadataCatalog + 'static,
{
    scheduler: TaskScheduler<R, A, C>,
    catalog: Arc<M>,
    clock: Arc<C>,
}

impl<R, A, C, M> BackupRunner<R, A, C, M>
where
    R: PipelineRepository + 'static,
    A: ActivitySink + 'static,
    C: Clock + Send + Sync + 'static,
    M: MetadataCatalog + 'static,
{
    /// Creates a runner.
    #[must_use]
    pub const fn new(scheduler: TaskScheduler<R, A, C>, catalog: Arc<M>, clock: Arc<C>) -> Self {
        Self {
            scheduler,
            catalog,
            clock,
        }
    }

    /// Enqueues a backup for every database whose policy is due.
    ///
    /// A database is skipped while its latest backup task is pending or
    /// running. Failures for one database are logged and do not stop the
    /// others.
    ///
    /// # Errors
    ///
    /// Returns [`BackupRunnerError::Catalog`] when the database list cannot
    /// be read.
    pub async fn run_once(&self) -> Result<Vec<PipelineId>, BackupRunnerError> {
        let databases = self.catalog.list_backup_enabled_databases().await?;
        let mut enqueued = Vec::new();
        for database in databases {
            match self.enqueue_if_due(&database).await {
                Ok(Some(pipeline)) => enqueued.push(pipeline.id()),
                Ok(None) => {}
                Err(err) => warn!(
                    database_id = %database.id(),
                    error = %err,
                    "scheduled backup skipped"
                ),
            }
        }
        Ok(enqueued)
    }

    /// Enqueues an ad-hoc backup outside the schedule.
    ///
    /// # Errors
    ///
    /// Returns [`BackupRunnerError::DatabaseNotFound`] or
    /// [`BackupRunnerError::InstanceNotFound`] for unknown targets, or the
    /// scheduler's error when the pipeline cannot be stored.
    pub async fn trigger_backup(
        &self,
        database_id: DatabaseId,
    ) -> Result<Pipeline, BackupRunnerError> {
        let database = self
            .catalog
            .find_database(database_id)
            .await?
            .ok_or(BackupRunnerError::DatabaseNotFound(database_id))?;
        let name = backup_name(database.name(), self.clock.utc(), "manual");
        self.submit(&database, &name).await
    }

    async fn enqueue_if_due(
        &self,
        database: &Database,
    ) -> Result<Option<Pipeline>, BackupRunnerError> {
        let Some(policy) = database.backup_policy() else {
            return Ok(None);
        };
        let latest = self
            .scheduler
            .latest_task_for_database(database.id(), TaskType::DatabaseBackup)
            .await?;
        if latest
            .as_ref()
            .is_some_and(|task| matches!(task.status(), TaskStatus::Pending | TaskStatus::Running))
        {
            debug!(database_id = %database.id(), "backup already queued");
            return Ok(None);
        }
        let now = self.clock.utc();
        if !policy.is_due(latest.as_ref().map(|task| task.created_at()), now) {
            return Ok(None);
        }
        let name = backup_name(database.name(), now, "autobackup");
        self.submit(database, &name).await.map(Some)
    }

    async fn submit(
        &self,
        database: &Database,
        name: &str,
    ) -> Result<Pipeline, BackupRunnerError> {
        let instance = self
            .catalog
            .find_instance(database.instance_id())
            .await?
            .ok_or(BackupRunnerError::InstanceNotFound(database.instance_id()))?;
        let pipeline = self.scheduler.submit_backup(&instance, database, name).await?;
        info!(
            database_id = %database.id(),
            pipeline_id = %pipeline.id(),
            backup = name,
            "backup enqueued"
        );
        Ok(pipeline)
    }

    /// Checks backup policies on every tick until `cancel` fires.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(err) = self.run_once().await {
                error!(error = %err, "backup cycle failed");
            }
        }
        debug!("backup loop stopped");
    }
}

fn backup_name(database: &str, at: DateTime<Utc>, suffix: &str) -> String {
    format!("{database}-{}-{suffix}", at.format("%Y%m%dT%H%M%S"))
}
