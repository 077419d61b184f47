//! Schema syncer: refreshes cached metadata from every instance.

use crate::instance::{
    domain::{Instance, InstanceId, InstanceSchema},
    ports::{CatalogError, InstanceDriver, MetadataCatalog},
};
use mockable::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One instance that could not be synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    /// Instance that failed.
    pub instance_id: InstanceId,
    /// Reason recorded in the catalog.
    pub error: String,
}

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Instances whose metadata was refreshed.
    pub synced: Vec<InstanceId>,
    /// Instances whose sync failed; their cached metadata is unchanged.
    pub failed: Vec<SyncFailure>,
}

/// Reads live schemas and writes them to the catalog.
///
/// Instances are read concurrently, each under its own timeout. The
/// catalog is written by this type alone.
pub struct SchemaSyncer<M, D, C>
where
    M: MetadataCatalog + 'static,
    D: InstanceDriver + 'static,
    C: Clock + Send + Sync + 'static,
{
    catalog: Arc<M>,
    driver: Arc<D>,
    clock: Arc<C>,
    per_instance_timeout: Duration,
}

impl<M, D, C> SchemaSyncer<M, D, C>
where
    M: MetadataCatalog + 'static,
    D: InstanceDriver + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a syncer.
    #[must_use]
    pub const fn new(
        catalog: Arc<M>,
        driver: Arc<D>,
        clock: Arc<C>,
        per_instance_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            driver,
            clock,
            per_instance_timeout,
        }
    }

    /// Syncs every registered instance once.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] only when the instance list cannot be read;
    /// per-instance failures are reported in the [`SyncReport`].
    pub async fn sync_all(&self) -> Result<SyncReport, CatalogError> {
        let instances = self.catalog.list_instances().await?;
        let mut workers = JoinSet::new();
        let mut owners = HashMap::with_capacity(instances.len());
        for instance in instances {
            let instance_id = instance.id();
            let driver = Arc::clone(&self.driver);
            let limit = self.per_instance_timeout;
            let handle = workers.spawn(async move {
                fetch(driver.as_ref(), &instance, limit).await
            });
            owners.insert(handle.id(), instance_id);
        }

        let mut report = SyncReport::default();
        while let Some(joined) = workers.join_next_with_id().await {
            let (worker, outcome) =
                joined.unwrap_or_else(|err| (err.id(), Err(format!("sync worker failed: {err}"))));
            match owners.remove(&worker) {
                Some(instance_id) => self.apply(instance_id, outcome, &mut report).await,
                None => error!(task = %worker, "sync worker finished for no instance"),
            }
        }
        report.synced.sort();
        report.failed.sort_by_key(|failure| failure.instance_id);
        Ok(report)
    }

    async fn apply(
        &self,
        instance_id: InstanceId,
        outcome: Result<InstanceSchema, String>,
        report: &mut SyncReport,
    ) {
        let now = self.clock.utc();
        match outcome {
            Ok(schema) => match self.catalog.apply_sync(instance_id, &schema, now).await {
                Ok(()) => {
                    info!(
                        instance_id = %instance_id,
                        databases = schema.databases.len(),
                        "instance synced"
                    );
                    report.synced.push(instance_id);
                }
                Err(err) => {
                    error!(instance_id = %instance_id, error = %err, "failed to store sync");
                    report.failed.push(SyncFailure {
                        instance_id,
                        error: err.to_string(),
                    });
                }
            },
            Err(message) => {
                warn!(instance_id = %instance_id, error = %message, "instance sync failed");
                if let Err(err) = self
                    .catalog
                    .record_sync_failure(instance_id, &message, now)
                    .await
                {
                    error!(
                        instance_id = %instance_id,
                        error = %err,
                        "failed to record sync failure"
                    );
                }
                report.failed.push(SyncFailure {
                    instance_id,
                    error: message,
                });
            }
        }
    }

    /// Syncs on every tick until `cancel` fires.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.sync_all().await {
                Ok(report) => debug!(
                    synced = report.synced.len(),
                    failed = report.failed.len(),
                    "sync cycle finished"
                ),
                Err(err) => error!(error = %err, "sync cycle failed"),
            }
        }
        debug!("schema sync loop stopped");
    }
}

async fn fetch<D>(
    driver: &D,
    instance: &Instance,
    limit: Duration,
) -> Result<InstanceSchema, String>
where
    D: InstanceDriver + ?Sized,
{
    match tokio::time::timeout(limit, driver.fetch_schema(instance)).await {
        Ok(Ok(schema)) => Ok(schema),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err(format!("sync timed out after {}ms", limit.as_millis())),
    }
}
