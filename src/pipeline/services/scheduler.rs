//! Task scheduler: the single writer of the pipeline graph.
//!
//! [`TaskScheduler::dispatch`] claims eligible pending tasks, hands each to
//! the executor registered for its type, and records the outcome together
//! with any migration history once the executor returns. A task is eligible
//! when its stage is the first unfinished stage of its pipeline, no earlier
//! task in that stage has failed or been canceled, and no other task holds
//! the same database (or instance, for tasks without a database).

use super::running::RunningTasks;
use crate::executor::{ExecutionContext, ExecutionOutput, ExecutorRegistry};
use crate::instance::domain::{Database, DatabaseId, Instance, InstanceId};
use crate::pipeline::{
    domain::{
        Activity, ActivityContainer, ActivityLevel, ActivityType, ExecutionError,
        ExecutionErrorKind, IssueRef, MigrationHistory, NewMigrationHistory, Pipeline,
        PipelineDomainError, PipelineId, PipelineSpec, Stage, StageId, StageSpec, TargetKey, Task,
        TaskId, TaskPayload, TaskSpec, TaskStatus, TaskStatusUpdatePayload, TaskType,
    },
    ports::{ActivitySink, PipelineRepository, PipelineRepositoryError},
};
use mockable::Clock;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Tuning knobs for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Upper bound on executors running at once.
    pub max_concurrent_tasks: usize,
    /// How a finished task's outcome is retried when the store rejects it.
    pub outcome_retry: OutcomeRetry,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 8,
            outcome_retry: OutcomeRetry::default(),
        }
    }
}

/// Backoff applied while persisting a finished task's outcome.
///
/// After `attempts` failed writes of the outcome the scheduler stops trying
/// to store it and instead marks the task failed, retrying that write with
/// the same backoff until it is stored or the scheduler shuts down. The task
/// keeps its target reserved the whole time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeRetry {
    /// Writes of the real outcome before falling back to a failure.
    pub attempts: u32,
    /// Delay before the first retry; doubled after each failure.
    pub initial_backoff: Duration,
    /// Upper bound on the delay between retries.
    pub max_backoff: Duration,
}

impl Default for OutcomeRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Service-level errors for scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] PipelineDomainError),

    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] PipelineRepositoryError),

    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The task is marked running but no executor in this process owns it.
    #[error("task {0} is not running in this process")]
    NotRunningHere(TaskId),
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// What a cancellation request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The pending task was canceled immediately.
    Canceled(Task),
    /// The running executor was asked to stop at its next checkpoint.
    Signalled(TaskId),
}

type RunOutcome = Result<Result<ExecutionOutput, ExecutionError>, JoinError>;

struct SchedulerInner<R, A, C> {
    repository: Arc<R>,
    activities: Arc<A>,
    clock: Arc<C>,
    registry: Arc<ExecutorRegistry>,
    options: SchedulerOptions,
    running: RunningTasks,
    dispatch_lock: Mutex<()>,
    wake: Arc<Notify>,
    finished: Notify,
    tracker: TaskTracker,
    stopping: CancellationToken,
}

/// Dispatches tasks and records their outcomes.
pub struct TaskScheduler<R, A, C>
where
    R: PipelineRepository + 'static,
    A: ActivitySink + 'static,
    C: Clock + Send + Sync + 'static,
{
    inner: Arc<SchedulerInner<R, A, C>>,
}

impl<R, A, C> Clone for TaskScheduler<R, A, C>
where
    R: PipelineRepository + 'static,
    A: ActivitySink + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, A, C> TaskScheduler<R, A, C>
where
    R: PipelineRepository + 'static,
    A: ActivitySink + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a scheduler.
    #[must_use]
    pub fn new(
        repository: Arc<R>,
        activities: Arc<A>,
        clock: Arc<C>,
        registry: Arc<ExecutorRegistry>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                repository,
                activities,
                clock,
                registry,
                options,
                running: RunningTasks::default(),
                dispatch_lock: Mutex::new(()),
                wake: Arc::new(Notify::new()),
                finished: Notify::new(),
                tracker: TaskTracker::new(),
                stopping: CancellationToken::new(),
            }),
        }
    }

    /// Returns the notifier that wakes the dispatch loop early.
    #[must_use]
    pub fn wake_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.inner.wake)
    }

    /// Returns how many executors are currently running.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.inner.running.len()
    }

    /// Stores a new pipeline and wakes the dispatch loop.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Domain`] when the pipeline definition is invalid or
    /// [`SchedulerError::Repository`] when it cannot be stored.
    pub async fn submit_pipeline(&self, spec: PipelineSpec) -> SchedulerResult<Pipeline> {
        let pipeline = Pipeline::new(spec, &*self.inner.clock)?;
        self.inner.repository.store(&pipeline).await?;
        info!(
            pipeline_id = %pipeline.id(),
            stages = pipeline.stages().len(),
            "pipeline submitted"
        );
        self.inner.wake.notify_one();
        Ok(pipeline)
    }

    /// Enqueues a one-task backup pipeline for a database.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] when the pipeline cannot be stored.
    pub async fn submit_backup(
        &self,
        instance: &Instance,
        database: &Database,
        backup_name: &str,
    ) -> SchedulerResult<Pipeline> {
        let spec = PipelineSpec {
            name: format!("Backup {}", database.name()),
            issue: None,
            stages: vec![StageSpec {
                name: "Backup".to_owned(),
                environment: instance.environment().clone(),
                tasks: vec![TaskSpec {
                    name: format!("Backup {backup_name}"),
                    instance_id: instance.id(),
                    database_id: Some(database.id()),
                    payload: TaskPayload::DatabaseBackup {
                        backup_name: backup_name.to_owned(),
                    },
                }],
            }],
        };
        let pipeline = self.submit_pipeline(spec).await?;
        self.record_activity(&Activity::new(
            ActivityContainer::Pipeline(pipeline.id()),
            ActivityType::BackupTrigger,
            ActivityLevel::Info,
            format!("Backup {backup_name} of {} enqueued", database.name()),
            json!({
                "databaseId": database.id(),
                "databaseName": database.name(),
                "backupName": backup_name,
            }),
            self.inner.clock.utc(),
        ))
        .await;
        Ok(pipeline)
    }

    /// Returns a failed or canceled task to the queue.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::TaskNotFound`] for an unknown task or
    /// [`SchedulerError::Domain`] when the task is not failed or canceled.
    pub async fn resubmit_task(&self, task_id: TaskId) -> SchedulerResult<Task> {
        let mut task = self.require_task(task_id).await?;
        let previous = task.status();
        task.resubmit(&*self.inner.clock)?;
        self.inner.repository.update_task(&task).await?;
        info!(task_id = %task_id, from = %previous, "task resubmitted");

        let issue = self.issue_of(task.pipeline_id()).await?;
        self.record_task_activity(issue.as_ref(), &task, previous, ActivityType::TaskResubmit)
            .await;
        self.inner.wake.notify_one();
        Ok(task)
    }

    /// Cancels a pending task or signals a running one.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Domain`] when the task has already finished,
    /// or [`SchedulerError::NotRunningHere`] when it is marked running by
    /// another process.
    pub async fn cancel_task(&self, task_id: TaskId) -> SchedulerResult<CancelOutcome> {
        let _claim = self.inner.dispatch_lock.lock().await;
        let mut task = self.require_task(task_id).await?;
        let issue = self.issue_of(task.pipeline_id()).await?;
        match task.status() {
            TaskStatus::Pending => {
                task.cancel(
                    Some(ExecutionError::new(
                        ExecutionErrorKind::Canceled,
                        "canceled before it started",
                    )),
                    &*self.inner.clock,
                )?;
                self.inner.repository.update_task(&task).await?;
                info!(task_id = %task_id, "pending task canceled");
                self.record_task_activity(
                    issue.as_ref(),
                    &task,
                    TaskStatus::Pending,
                    ActivityType::TaskCancel,
                )
                .await;
                Ok(CancelOutcome::Canceled(task))
            }
            TaskStatus::Running => {
                if !self.inner.running.cancel(task_id) {
                    return Err(SchedulerError::NotRunningHere(task_id));
                }
                info!(task_id = %task_id, "cancellation requested");
                self.record_task_activity(
                    issue.as_ref(),
                    &task,
                    TaskStatus::Running,
                    ActivityType::TaskCancel,
                )
                .await;
                Ok(CancelOutcome::Signalled(task_id))
            }
            status => Err(PipelineDomainError::InvalidStateTransition {
                task_id,
                from: status,
                to: TaskStatus::Canceled,
            }
            .into()),
        }
    }

    /// Fails tasks left running by a previous process.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Repository`] when the tasks cannot be read
    /// or updated.
    pub async fn recover_interrupted(&self) -> SchedulerResult<usize> {
        let orphaned = self
            .inner
            .repository
            .list_tasks_by_status(TaskStatus::Running)
            .await?;
        let mut recovered = 0_usize;
        for mut task in orphaned {
            if self.inner.running.contains(task.id()) {
                continue;
            }
            task.fail(
                ExecutionError::interrupted("process stopped while the task was running"),
                &*self.inner.clock,
            )?;
            self.inner.repository.record_outcome(&task, None).await?;
            warn!(task_id = %task.id(), "interrupted task marked failed");
            let issue = self.issue_of(task.pipeline_id()).await?;
            self.record_task_activity(
                issue.as_ref(),
                &task,
                TaskStatus::Running,
                ActivityType::TaskStatusUpdate,
            )
            .await;
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Starts every eligible pending task, returning how many were started.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] when the graph cannot be read or a claim
    /// cannot be persisted. Tasks claimed before the failure keep running.
    pub async fn dispatch(&self) -> SchedulerResult<usize> {
        let _claim = self.inner.dispatch_lock.lock().await;
        if self.inner.tracker.is_closed() {
            return Ok(0);
        }

        let pipelines = self.inner.repository.list_active().await?;
        let mut busy = self.inner.running.targets();
        busy.extend(
            pipelines
                .iter()
                .flat_map(Pipeline::tasks)
                .filter(|task| task.status() == TaskStatus::Running)
                .map(Task::target),
        );
        let capacity = self
            .inner
            .options
            .max_concurrent_tasks
            .saturating_sub(self.inner.running.len());

        let claimed = select_eligible(&pipelines, &mut busy, capacity);
        let mut started = 0_usize;
        for (issue, task) in claimed {
            self.launch(issue, task).await?;
            started += 1;
        }
        if started > 0 {
            debug!(started, "dispatched tasks");
        }
        Ok(started)
    }

    /// Waits until no executor is running.
    pub async fn wait_idle(&self) {
        loop {
            let finished = self.inner.finished.notified();
            tokio::pin!(finished);
            finished.as_mut().enable();
            if self.inner.running.is_empty() {
                return;
            }
            finished.await;
        }
    }

    /// Dispatches and waits repeatedly until nothing is runnable.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] when a dispatch pass fails.
    pub async fn run_until_quiescent(&self) -> SchedulerResult<()> {
        loop {
            let started = self.dispatch().await?;
            if started == 0 && self.inner.running.is_empty() {
                return Ok(());
            }
            self.wait_idle().await;
        }
    }

    /// Stops dispatching, waits up to `grace` for running executors, then
    /// aborts the rest, which are recorded as interrupted failures.
    pub async fn shutdown(&self, grace: Duration) {
        {
            let _claim = self.inner.dispatch_lock.lock().await;
            self.inner.tracker.close();
        }
        if tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_ok()
        {
            info!("scheduler drained");
            return;
        }
        let aborted = self.inner.running.abort_all();
        warn!(aborted, "shutdown grace expired; aborting running tasks");
        self.inner.stopping.cancel();
        self.inner.tracker.wait().await;
    }

    /// Loads a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Repository`] when the lookup fails.
    pub async fn get_pipeline(&self, id: PipelineId) -> SchedulerResult<Option<Pipeline>> {
        Ok(self.inner.repository.find_pipeline(id).await?)
    }

    /// Loads a stage.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Repository`] when the lookup fails.
    pub async fn get_stage(&self, id: StageId) -> SchedulerResult<Option<Stage>> {
        Ok(self.inner.repository.find_stage(id).await?)
    }

    /// Loads a task.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Repository`] when the lookup fails.
    pub async fn get_task(&self, id: TaskId) -> SchedulerResult<Option<Task>> {
        Ok(self.inner.repository.find_task(id).await?)
    }

    /// Lists pipelines created for an issue.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Repository`] when the lookup fails.
    pub async fn list_pipelines_for_issue(
        &self,
        issue: &IssueRef,
    ) -> SchedulerResult<Vec<Pipeline>> {
        Ok(self.inner.repository.list_pipelines_by_issue(issue).await?)
    }

    /// Lists the migration history of a database in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Repository`] when the lookup fails.
    pub async fn list_migration_history(
        &self,
        instance_id: InstanceId,
        database_name: &str,
    ) -> SchedulerResult<Vec<MigrationHistory>> {
        Ok(self
            .inner
            .repository
            .list_migration_history(instance_id, database_name)
            .await?)
    }

    /// Returns the most recent task of a type targeting a database.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Repository`] when the lookup fails.
    pub async fn latest_task_for_database(
        &self,
        database_id: DatabaseId,
        task_type: TaskType,
    ) -> SchedulerResult<Option<Task>> {
        Ok(self
            .inner
            .repository
            .latest_task_for_database(database_id, task_type)
            .await?)
    }

    async fn launch(&self, issue: Option<IssueRef>, mut task: Task) -> SchedulerResult<()> {
        task.start(&*self.inner.clock)?;
        self.inner.repository.update_task(&task).await?;
        info!(task_id = %task.id(), task_type = %task.task_type(), "task started");
        self.record_task_activity(
            issue.as_ref(),
            &task,
            TaskStatus::Pending,
            ActivityType::TaskStatusUpdate,
        )
        .await;

        let cancel = CancellationToken::new();
        self.inner
            .running
            .insert(task.id(), task.target(), cancel.clone());

        let executor = self.inner.registry.executor_for(task.task_type());
        let ctx = ExecutionContext::new(cancel);
        let claimed = task.clone();
        let handle = tokio::spawn(async move { executor.run(&ctx, &claimed).await });
        self.inner
            .running
            .attach_abort(task.id(), handle.abort_handle());

        let scheduler = self.clone();
        self.inner.tracker.spawn(async move {
            let outcome = handle.await;
            scheduler.finish(issue.as_ref(), task, outcome).await;
        });
        Ok(())
    }

    async fn finish(&self, issue: Option<&IssueRef>, mut task: Task, outcome: RunOutcome) {
        let task_id = task.id();
        let claimed = task.clone();
        let clock = &*self.inner.clock;
        let transition = match outcome {
            Ok(Ok(output)) => {
                let history = output.migration.map(|record| NewMigrationHistory {
                    task_id,
                    instance_id: task.instance_id(),
                    issue: issue.cloned(),
                    record,
                    created_at: clock.utc(),
                });
                task.complete(output.result, clock).map(|()| history)
            }
            Ok(Err(err)) if err.kind() == ExecutionErrorKind::Canceled => {
                task.cancel(Some(err), clock).map(|()| None)
            }
            Ok(Err(err)) => task.fail(err, clock).map(|()| None),
            Err(join) if join.is_cancelled() => task
                .fail(
                    ExecutionError::interrupted("aborted after the shutdown grace period"),
                    clock,
                )
                .map(|()| None),
            Err(join) => task
                .fail(
                    ExecutionError::internal(format!("executor panicked: {join}")),
                    clock,
                )
                .map(|()| None),
        };

        match transition {
            Ok(history) => match self.persist_outcome(&claimed, task, history).await {
                Some((stored, recorded)) => {
                    log_outcome(&stored, recorded.as_ref());
                    self.record_task_activity(
                        issue,
                        &stored,
                        TaskStatus::Running,
                        ActivityType::TaskStatusUpdate,
                    )
                    .await;
                }
                None => error!(task_id = %task_id, "task left running; recovered on next start"),
            },
            Err(err) => error!(task_id = %task_id, error = %err, "invalid task transition"),
        }

        self.inner.running.remove(task_id);
        self.inner.finished.notify_waiters();
        self.inner.wake.notify_one();
    }

    /// Stores a finished task, retrying with backoff while its target stays
    /// reserved, and returns what was stored. `claimed` is the task as it
    /// was while running. Returns `None` when shutdown cut the retries off.
    async fn persist_outcome(
        &self,
        claimed: &Task,
        task: Task,
        history: Option<NewMigrationHistory>,
    ) -> Option<(Task, Option<MigrationHistory>)> {
        let retry = self.inner.options.outcome_retry;
        let mut backoff = retry.initial_backoff;
        let mut failures = 0_u32;
        let mut fallback: Option<Task> = None;
        loop {
            let attempt = match &fallback {
                None => self
                    .inner
                    .repository
                    .record_outcome(&task, history.clone())
                    .await
                    .map(|recorded| (task.clone(), recorded)),
                Some(failed) => self
                    .inner
                    .repository
                    .update_task(failed)
                    .await
                    .map(|()| (failed.clone(), None)),
            };
            let err = match attempt {
                Ok(stored) => return Some(stored),
                // An earlier attempt committed but its reply was lost.
                Err(PipelineRepositoryError::DuplicateHistory(_))
                    if fallback.is_none() && failures > 0 =>
                {
                    warn!(task_id = %task.id(), "task outcome was already recorded");
                    return Some((task, None));
                }
                Err(err) => err,
            };
            failures = failures.saturating_add(1);
            warn!(
                task_id = %task.id(),
                attempt = failures,
                error = %err,
                "failed to record task outcome"
            );

            if fallback.is_none() && failures >= retry.attempts {
                match self.failed_in_place_of(claimed, &err) {
                    Ok(failed) => fallback = Some(failed),
                    Err(transition) => {
                        error!(task_id = %task.id(), error = %transition, "cannot fail task");
                        return None;
                    }
                }
            }

            tokio::select! {
                () = self.inner.stopping.cancelled() => return None,
                () = tokio::time::sleep(backoff) => {}
            }
            backoff = backoff.saturating_mul(2).min(retry.max_backoff);
        }
    }

    fn failed_in_place_of(
        &self,
        claimed: &Task,
        cause: &PipelineRepositoryError,
    ) -> Result<Task, PipelineDomainError> {
        let mut failed = claimed.clone();
        failed.fail(
            ExecutionError::internal(format!("task outcome could not be recorded: {cause}")),
            &*self.inner.clock,
        )?;
        Ok(failed)
    }

    async fn require_task(&self, task_id: TaskId) -> SchedulerResult<Task> {
        self.inner
            .repository
            .find_task(task_id)
            .await?
            .ok_or(SchedulerError::TaskNotFound(task_id))
    }

    async fn issue_of(&self, pipeline_id: PipelineId) -> SchedulerResult<Option<IssueRef>> {
        Ok(self
            .inner
            .repository
            .find_pipeline(pipeline_id)
            .await?
            .and_then(|pipeline| pipeline.issue().cloned()))
    }

    async fn record_task_activity(
        &self,
        issue: Option<&IssueRef>,
        task: &Task,
        previous: TaskStatus,
        activity_type: ActivityType,
    ) {
        let container = issue.map_or(ActivityContainer::Pipeline(task.pipeline_id()), |issue| {
            ActivityContainer::Issue(issue.clone())
        });
        let payload = TaskStatusUpdatePayload {
            task_id: task.id(),
            old_status: previous,
            new_status: task.status(),
            issue_name: issue.map(ToString::to_string),
            task_name: task.name().to_owned(),
        };
        let payload_json = match serde_json::to_value(&payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(task_id = %task.id(), error = %err, "failed to encode activity payload");
                serde_json::Value::Null
            }
        };
        let comment = match task.error() {
            Some(err) => format!("{} {} -> {}: {err}", task.name(), previous, task.status()),
            None => format!("{} {} -> {}", task.name(), previous, task.status()),
        };
        self.record_activity(&Activity::new(
            container,
            activity_type,
            ActivityLevel::for_status(task.status()),
            comment,
            payload_json,
            self.inner.clock.utc(),
        ))
        .await;
    }

    async fn record_activity(&self, activity: &Activity) {
        if let Err(err) = self.inner.activities.record(activity).await {
            warn!(
                activity_type = %activity.activity_type(),
                error = %err,
                "failed to record activity"
            );
        }
    }
}

fn select_eligible(
    pipelines: &[Pipeline],
    busy: &mut HashSet<TargetKey>,
    capacity: usize,
) -> Vec<(Option<IssueRef>, Task)> {
    let mut claimed = Vec::new();
    for pipeline in pipelines {
        let Some(stage) = pipeline.active_stage() else {
            continue;
        };
        if stage.is_halted() {
            continue;
        }
        for task in stage.tasks() {
            if claimed.len() >= capacity {
                return claimed;
            }
            if task.status() != TaskStatus::Pending || !busy.insert(task.target()) {
                continue;
            }
            claimed.push((pipeline.issue().cloned(), task.clone()));
        }
    }
    claimed
}

fn log_outcome(task: &Task, history: Option<&MigrationHistory>) {
    match (task.status(), task.error()) {
        (TaskStatus::Failed, Some(err)) => warn!(
            task_id = %task.id(),
            kind = %err.kind(),
            error = %err,
            "task failed"
        ),
        (TaskStatus::Canceled, _) => info!(task_id = %task.id(), "task canceled"),
        (status, _) => info!(
            task_id = %task.id(),
            status = %status,
            history_sequence = history.map(|entry| entry.sequence),
            "task finished"
        ),
    }
}
