//! When steps for pipeline scheduling BDD scenarios.

use super::world::{SchedulingWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::when;
use schemaflow::instance::adapters::memory::InstanceBehaviour;
use schemaflow::pipeline::domain::TaskStatus;

#[when("the scheduler dispatches once")]
fn dispatch_once(world: &mut SchedulingWorld) -> Result<(), eyre::Report> {
    run_async(world.scheduler.dispatch()).wrap_err("dispatch pass")?;
    Ok(())
}

#[when("the scheduler runs until idle")]
fn run_until_idle(world: &mut SchedulingWorld) -> Result<(), eyre::Report> {
    run_async(world.scheduler.run_until_quiescent()).wrap_err("run scheduler until idle")?;
    Ok(())
}

#[when("failing statements are fixed")]
fn failures_fixed(world: &mut SchedulingWorld) -> Result<(), eyre::Report> {
    world
        .driver
        .set_behaviour(world.instance.id(), InstanceBehaviour::default())?;
    Ok(())
}

#[when("the failed task is resubmitted")]
fn resubmit_failed(world: &mut SchedulingWorld) -> Result<(), eyre::Report> {
    let pipeline = world.reload_pipeline()?;
    let failed = pipeline
        .tasks()
        .find(|task| task.status() == TaskStatus::Failed)
        .ok_or_else(|| eyre::eyre!("no failed task to resubmit"))?;
    run_async(world.scheduler.resubmit_task(failed.id())).wrap_err("resubmit failed task")?;
    Ok(())
}

#[when(r#"the pending task on "{database}" is canceled"#)]
fn cancel_pending(world: &mut SchedulingWorld, database: String) -> Result<(), eyre::Report> {
    let database_id = world.database(&database)?.id();
    let pipeline = world.reload_pipeline()?;
    let pending = pipeline
        .tasks()
        .find(|task| {
            task.database_id() == Some(database_id) && task.status() == TaskStatus::Pending
        })
        .ok_or_else(|| eyre::eyre!("no pending task on {database}"))?;
    run_async(world.scheduler.cancel_task(pending.id())).wrap_err("cancel pending task")?;
    Ok(())
}
