//! Unit tests for task status transitions.

use super::fixtures::general;
use crate::instance::domain::InstanceId;
use crate::pipeline::domain::{
    ExecutionError, PipelineDomainError, PipelineId, StageId, Task, TaskResult, TaskStatus,
};
use eyre::ensure;
use mockable::DefaultClock;
use rstest::{fixture, rstest};

#[fixture]
fn clock() -> DefaultClock {
    DefaultClock
}

#[fixture]
fn pending_task(clock: DefaultClock) -> Task {
    Task::new(
        PipelineId::new(),
        StageId::new(),
        general("noop", InstanceId::new()),
        &clock,
    )
    .expect("valid task")
}

#[rstest]
#[case(TaskStatus::Pending, TaskStatus::Running, true)]
#[case(TaskStatus::Pending, TaskStatus::Canceled, true)]
#[case(TaskStatus::Pending, TaskStatus::Done, false)]
#[case(TaskStatus::Pending, TaskStatus::Failed, false)]
#[case(TaskStatus::Running, TaskStatus::Done, true)]
#[case(TaskStatus::Running, TaskStatus::Failed, true)]
#[case(TaskStatus::Running, TaskStatus::Canceled, true)]
#[case(TaskStatus::Running, TaskStatus::Pending, false)]
#[case(TaskStatus::Done, TaskStatus::Pending, false)]
#[case(TaskStatus::Done, TaskStatus::Running, false)]
#[case(TaskStatus::Failed, TaskStatus::Pending, true)]
#[case(TaskStatus::Failed, TaskStatus::Running, false)]
#[case(TaskStatus::Canceled, TaskStatus::Pending, true)]
#[case(TaskStatus::Canceled, TaskStatus::Done, false)]
fn transition_table(#[case] from: TaskStatus, #[case] to: TaskStatus, #[case] allowed: bool) {
    assert_eq!(from.can_transition_to(to), allowed);
}

#[rstest]
fn start_records_start_time(mut pending_task: Task, clock: DefaultClock) -> eyre::Result<()> {
    pending_task.start(&clock)?;

    ensure!(pending_task.status() == TaskStatus::Running);
    ensure!(pending_task.started_at().is_some());
    ensure!(pending_task.completed_at().is_none());
    Ok(())
}

#[rstest]
fn completing_a_pending_task_is_rejected(mut pending_task: Task, clock: DefaultClock) {
    let result = pending_task.complete(TaskResult::detail("done"), &clock);

    assert!(matches!(
        result,
        Err(PipelineDomainError::InvalidStateTransition {
            from: TaskStatus::Pending,
            to: TaskStatus::Done,
            ..
        })
    ));
    assert_eq!(pending_task.status(), TaskStatus::Pending);
}

#[rstest]
fn resubmit_clears_previous_run(mut pending_task: Task, clock: DefaultClock) -> eyre::Result<()> {
    pending_task.start(&clock)?;
    pending_task.fail(ExecutionError::internal("boom"), &clock)?;
    ensure!(pending_task.error().is_some());

    pending_task.resubmit(&clock)?;

    ensure!(pending_task.status() == TaskStatus::Pending);
    ensure!(pending_task.error().is_none());
    ensure!(pending_task.started_at().is_none());
    ensure!(pending_task.completed_at().is_none());
    Ok(())
}

#[rstest]
fn done_task_cannot_be_resubmitted(
    mut pending_task: Task,
    clock: DefaultClock,
) -> eyre::Result<()> {
    pending_task.start(&clock)?;
    pending_task.complete(TaskResult::detail("ok"), &clock)?;

    ensure!(pending_task.resubmit(&clock).is_err());
    ensure!(pending_task.cancel(None, &clock).is_err());
    Ok(())
}
