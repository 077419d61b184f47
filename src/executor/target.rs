//! Resolution of a task's target through the metadata catalog.

use crate::instance::{
    domain::{Database, Instance},
    ports::MetadataCatalog,
};
use crate::pipeline::domain::{ExecutionError, Task};

pub(super) async fn resolve_instance(
    catalog: &dyn MetadataCatalog,
    task: &Task,
) -> Result<Instance, ExecutionError> {
    catalog
        .find_instance(task.instance_id())
        .await?
        .ok_or_else(|| {
            ExecutionError::invalid_payload(format!("instance {} not found", task.instance_id()))
        })
}

pub(super) async fn resolve_database(
    catalog: &dyn MetadataCatalog,
    task: &Task,
) -> Result<Option<Database>, ExecutionError> {
    let Some(database_id) = task.database_id() else {
        return Ok(None);
    };
    let database = catalog.find_database(database_id).await?.ok_or_else(|| {
        ExecutionError::invalid_payload(format!("database {database_id} not found"))
    })?;
    if database.instance_id() != task.instance_id() {
        return Err(ExecutionError::invalid_payload(format!(
            "database {database_id} does not belong to instance {}",
            task.instance_id()
        )));
    }
    Ok(Some(database))
}

pub(super) async fn resolve_required_database(
    catalog: &dyn MetadataCatalog,
    task: &Task,
) -> Result<Database, ExecutionError> {
    resolve_database(catalog, task)
        .await?
        .ok_or_else(|| ExecutionError::invalid_payload("task has no target database"))
}

pub(super) fn payload_mismatch(task: &Task) -> ExecutionError {
    ExecutionError::internal(format!(
        "executor cannot run {} payload of task {}",
        task.task_type(),
        task.id()
    ))
}
