//! Supervisor owning the background loops.

use super::{BackupRunner, SchemaSyncer, run_dispatch_loop};
use crate::instance::ports::{InstanceDriver, MetadataCatalog};
use crate::pipeline::{
    ports::{ActivitySink, PipelineRepository},
    services::TaskScheduler,
};
use mockable::Clock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

/// Loop intervals and the shutdown grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Dispatch loop tick.
    pub dispatch_interval: Duration,
    /// Schema syncer tick.
    pub sync_interval: Duration,
    /// Backup runner tick.
    pub backup_interval: Duration,
    /// How long running executors may continue after shutdown starts.
    pub shutdown_grace: Duration,
}

/// Running background loops.
pub struct Runtime<R, A, C>
where
    R: PipelineRepository + 'static,
    A: ActivitySink + 'static,
    C: Clock + Send + Sync + 'static,
{
    scheduler: TaskScheduler<R, A, C>,
    cancel: CancellationToken,
    loops: TaskTracker,
    shutdown_grace: Duration,
}

impl<R, A, C> Runtime<R, A, C>
where
    R: PipelineRepository + 'static,
    A: ActivitySink + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Spawns the dispatch, sync, and backup loops.
    #[must_use]
    pub fn start<M, D>(
        scheduler: TaskScheduler<R, A, C>,
        syncer: SchemaSyncer<M, D, C>,
        backups: BackupRunner<R, A, C, M>,
        options: RuntimeOptions,
    ) -> Self
    where
        M: MetadataCatalog + 'static,
        D: InstanceDriver + 'static,
    {
        let cancel = CancellationToken::new();
        let loops = TaskTracker::new();
        loops.spawn(run_dispatch_loop(
            scheduler.clone(),
            options.dispatch_interval,
            cancel.clone(),
        ));
        loops.spawn(syncer.run(options.sync_interval, cancel.clone()));
        loops.spawn(backups.run(options.backup_interval, cancel.clone()));
        loops.close();
        info!("runtime started");
        Self {
            scheduler,
            cancel,
            loops,
            shutdown_grace: options.shutdown_grace,
        }
    }

    /// Returns a token that stops the loops when cancelled.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops the loops and drains the scheduler together.
    ///
    /// The grace period starts as soon as shutdown begins, so a loop still
    /// finishing its cycle does not delay the abort of running executors.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        tokio::join!(
            self.loops.wait(),
            self.scheduler.shutdown(self.shutdown_grace)
        );
        info!("runtime stopped");
    }
}
