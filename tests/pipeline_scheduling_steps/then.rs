//! Then steps for pipeline scheduling BDD scenarios.

use super::world::{SchedulingWorld, run_async};
use rstest_bdd_macros::then;
use schemaflow::pipeline::domain::TaskStatus;

#[then(r#"the task on "{database}" in stage "{stage}" is "{status}""#)]
fn task_status_is(
    world: &SchedulingWorld,
    database: String,
    stage: String,
    status: String,
) -> Result<(), eyre::Report> {
    let expected = TaskStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let task = world.task_on(&database, &stage)?;
    if task.status() != expected {
        return Err(eyre::eyre!(
            "expected {database} in {stage} to be {expected}, found {}",
            task.status()
        ));
    }
    Ok(())
}

#[then(r#"the pipeline is "{status}""#)]
fn pipeline_status_is(world: &SchedulingWorld, status: String) -> Result<(), eyre::Report> {
    let actual = world.reload_pipeline()?.status();
    if actual.as_str() != status {
        return Err(eyre::eyre!("expected pipeline {status}, found {actual}"));
    }
    Ok(())
}

#[then(r#"the history count of "{database}" is {count:usize}"#)]
fn history_count_is(
    world: &SchedulingWorld,
    database: String,
    count: usize,
) -> Result<(), eyre::Report> {
    let history = run_async(
        world
            .scheduler
            .list_migration_history(world.instance.id(), &database),
    )?;
    if history.len() != count {
        return Err(eyre::eyre!(
            "expected {count} history entries for {database}, found {}",
            history.len()
        ));
    }
    let sequences: Vec<u64> = history.iter().map(|entry| entry.sequence).collect();
    let expected: Vec<u64> = (1..=u64::try_from(count)?).collect();
    if sequences != expected {
        return Err(eyre::eyre!("history sequences out of order: {sequences:?}"));
    }
    Ok(())
}
