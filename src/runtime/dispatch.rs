//! Scheduler dispatch loop.

use crate::pipeline::{
    ports::{ActivitySink, PipelineRepository},
    services::TaskScheduler,
};
use mockable::Clock;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Dispatches on every tick and whenever the scheduler is woken, until
/// `cancel` fires.
pub async fn run_dispatch_loop<R, A, C>(
    scheduler: TaskScheduler<R, A, C>,
    interval: Duration,
    cancel: CancellationToken,
) where
    R: PipelineRepository + 'static,
    A: ActivitySink + 'static,
    C: Clock + Send + Sync + 'static,
{
    let wake = scheduler.wake_handle();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            () = wake.notified() => {}
        }
        if let Err(err) = scheduler.dispatch().await {
            error!(error = %err, "dispatch pass failed");
        }
    }
    debug!("dispatch loop stopped");
}
