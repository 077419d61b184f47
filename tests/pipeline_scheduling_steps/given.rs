//! Given steps for pipeline scheduling BDD scenarios.

use super::world::{SchedulingWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::given;
use schemaflow::instance::{
    adapters::memory::InstanceBehaviour,
    domain::{Database, DatabaseDefinition, EnvironmentName},
    ports::MetadataCatalog,
};
use schemaflow::pipeline::domain::{
    MigrationType, PipelineSpec, SchemaUpdatePayload, StageSpec, TaskPayload, TaskSpec,
};

#[given(r#"an instance with databases "{names}""#)]
fn instance_with_databases(
    world: &mut SchedulingWorld,
    names: String,
) -> Result<(), eyre::Report> {
    run_async(world.catalog.register_instance(&world.instance))
        .wrap_err("register scenario instance")?;
    for name in names.split(',').map(str::trim) {
        let definition = DatabaseDefinition::new(name, None, None)?;
        let database = Database::new(world.instance.id(), definition.clone());
        run_async(world.catalog.register_database(&database))
            .wrap_err_with(|| format!("register database {name}"))?;
        world.driver.add_database(world.instance.id(), definition)?;
        world.databases.push(database);
    }
    Ok(())
}

#[given(r#"statements containing "{marker}" fail"#)]
fn statements_fail(world: &mut SchedulingWorld, marker: String) -> Result<(), eyre::Report> {
    world.driver.set_behaviour(
        world.instance.id(),
        InstanceBehaviour {
            failing_statement: Some(marker),
            ..InstanceBehaviour::default()
        },
    )?;
    Ok(())
}

#[given(r#"a stage "{stage}" updating "{database}" with "{statement}""#)]
fn stage_updating(
    world: &mut SchedulingWorld,
    stage: String,
    database: String,
    statement: String,
) -> Result<(), eyre::Report> {
    let task = TaskSpec {
        name: format!("{stage} {database}"),
        instance_id: world.instance.id(),
        database_id: Some(world.database(&database)?.id()),
        payload: TaskPayload::DatabaseSchemaUpdate(SchemaUpdatePayload {
            statement,
            rollback_statement: None,
            version: world.stages.len().to_string(),
            description: format!("update {database}"),
            migration_type: MigrationType::Migrate,
        }),
    };
    match world.stages.last_mut() {
        Some(last) if last.name == stage => last.tasks.push(task),
        _ => world.stages.push(StageSpec {
            name: stage,
            environment: EnvironmentName::new("prod")?,
            tasks: vec![task],
        }),
    }
    Ok(())
}

#[given("the pipeline is submitted")]
fn pipeline_submitted(world: &mut SchedulingWorld) -> Result<(), eyre::Report> {
    let spec = PipelineSpec {
        name: "scenario rollout".to_owned(),
        issue: None,
        stages: std::mem::take(&mut world.stages),
    };
    let pipeline = run_async(world.scheduler.submit_pipeline(spec))
        .wrap_err("submit scenario pipeline")?;
    world.pipeline = Some(pipeline);
    Ok(())
}
