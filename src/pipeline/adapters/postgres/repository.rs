//! `PostgreSQL` repository implementation for pipelines and migration
//! history.

use super::{
    models::{MigrationHistoryRow, PipelineRow, StageRow, TaskRow, TaskStatusChangeset},
    schema::{migration_history, pipelines, stages, tasks},
};
use crate::instance::domain::{DatabaseId, EnvironmentName, InstanceId};
use crate::pg::{PgPool, run_blocking};
use crate::pipeline::{
    domain::{
        ExecutionError, IssueRef, MigrationEngine, MigrationHistory, MigrationType,
        NewMigrationHistory, PersistedTaskData, Pipeline, PipelineId, Stage, StageId, Task,
        TaskId, TaskPayload, TaskResult, TaskStatus, TaskType,
    },
    ports::{PipelineRepository, PipelineRepositoryError, PipelineRepositoryResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::collections::HashMap;
use uuid::Uuid;

/// `PostgreSQL`-backed pipeline repository.
#[derive(Debug, Clone)]
pub struct PostgresPipelineRepository {
    pool: PgPool,
}

impl PostgresPipelineRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run<F, T>(&self, f: F) -> PipelineRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> PipelineRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        run_blocking(
            &self.pool,
            PipelineRepositoryError::persistence,
            PipelineRepositoryError::persistence,
            f,
        )
        .await
    }
}

impl From<DieselError> for PipelineRepositoryError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

#[async_trait]
impl PipelineRepository for PostgresPipelineRepository {
    async fn store(&self, pipeline: &Pipeline) -> PipelineRepositoryResult<()> {
        let pipeline_id = pipeline.id();
        let (header, stage_rows, task_rows) = to_rows(pipeline)?;

        self.run(move |connection| {
            connection.transaction::<_, PipelineRepositoryError, _>(|conn| {
                diesel::insert_into(pipelines::table)
                    .values(&header)
                    .execute(conn)
                    .map_err(|err| match err {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            PipelineRepositoryError::DuplicatePipeline(pipeline_id)
                        }
                        _ => PipelineRepositoryError::persistence(err),
                    })?;
                diesel::insert_into(stages::table)
                    .values(&stage_rows)
                    .execute(conn)?;
                diesel::insert_into(tasks::table)
                    .values(&task_rows)
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn find_pipeline(&self, id: PipelineId) -> PipelineRepositoryResult<Option<Pipeline>> {
        self.run(move |connection| {
            let rows = pipelines::table
                .filter(pipelines::id.eq(id.into_inner()))
                .select(PipelineRow::as_select())
                .load(connection)?;
            Ok(load_pipelines(connection, rows)?.into_iter().next())
        })
        .await
    }

    async fn find_stage(&self, id: StageId) -> PipelineRepositoryResult<Option<Stage>> {
        self.run(move |connection| {
            let Some(row) = stages::table
                .filter(stages::id.eq(id.into_inner()))
                .select(StageRow::as_select())
                .first(connection)
                .optional()?
            else {
                return Ok(None);
            };
            let task_rows = tasks::table
                .filter(tasks::stage_id.eq(row.id))
                .order(tasks::position.asc())
                .select(TaskRow::as_select())
                .load(connection)?;
            let stage_tasks = task_rows
                .into_iter()
                .map(row_to_task)
                .collect::<PipelineRepositoryResult<Vec<_>>>()?;
            row_to_stage(row, stage_tasks).map(Some)
        })
        .await
    }

    async fn find_task(&self, id: TaskId) -> PipelineRepositoryResult<Option<Task>> {
        self.run(move |connection| {
            let row = tasks::table
                .filter(tasks::id.eq(id.into_inner()))
                .select(TaskRow::as_select())
                .first(connection)
                .optional()?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn list_pipelines_by_issue(
        &self,
        issue: &IssueRef,
    ) -> PipelineRepositoryResult<Vec<Pipeline>> {
        let issue_ref = issue.as_str().to_owned();
        self.run(move |connection| {
            let rows = pipelines::table
                .filter(pipelines::issue_ref.eq(issue_ref))
                .order(pipelines::created_at.asc())
                .select(PipelineRow::as_select())
                .load(connection)?;
            load_pipelines(connection, rows)
        })
        .await
    }

    async fn list_active(&self) -> PipelineRepositoryResult<Vec<Pipeline>> {
        self.run(move |connection| {
            let active_ids: Vec<Uuid> = tasks::table
                .filter(tasks::status.eq_any([
                    TaskStatus::Pending.as_str(),
                    TaskStatus::Running.as_str(),
                ]))
                .select(tasks::pipeline_id)
                .distinct()
                .load(connection)?;
            let rows = pipelines::table
                .filter(pipelines::id.eq_any(active_ids))
                .order(pipelines::created_at.asc())
                .select(PipelineRow::as_select())
                .load(connection)?;
            load_pipelines(connection, rows)
        })
        .await
    }

    async fn list_tasks_by_status(
        &self,
        status: TaskStatus,
    ) -> PipelineRepositoryResult<Vec<Task>> {
        self.run(move |connection| {
            tasks::table
                .filter(tasks::status.eq(status.as_str()))
                .order(tasks::created_at.asc())
                .select(TaskRow::as_select())
                .load(connection)?
                .into_iter()
                .map(row_to_task)
                .collect()
        })
        .await
    }

    async fn latest_task_for_database(
        &self,
        database_id: DatabaseId,
        task_type: TaskType,
    ) -> PipelineRepositoryResult<Option<Task>> {
        self.run(move |connection| {
            let row = tasks::table
                .filter(tasks::database_id.eq(database_id.into_inner()))
                .filter(tasks::task_type.eq(task_type.as_str()))
                .order(tasks::created_at.desc())
                .select(TaskRow::as_select())
                .first(connection)
                .optional()?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn update_task(&self, task: &Task) -> PipelineRepositoryResult<()> {
        let task_id = task.id();
        let changeset = to_changeset(task)?;
        self.run(move |connection| update_status(connection, task_id, &changeset))
            .await
    }

    async fn record_outcome(
        &self,
        task: &Task,
        history: Option<NewMigrationHistory>,
    ) -> PipelineRepositoryResult<Option<MigrationHistory>> {
        let task_id = task.id();
        let changeset = to_changeset(task)?;

        self.run(move |connection| {
            connection.transaction::<_, PipelineRepositoryError, _>(|conn| {
                update_status(conn, task_id, &changeset)?;
                let Some(new_entry) = history else {
                    return Ok(None);
                };

                let already_recorded: i64 = migration_history::table
                    .filter(migration_history::task_id.eq(task_id.into_inner()))
                    .count()
                    .get_result(conn)?;
                if already_recorded > 0 {
                    return Err(PipelineRepositoryError::DuplicateHistory(task_id));
                }

                let last_sequence: Option<i64> = migration_history::table
                    .filter(migration_history::instance_id.eq(new_entry.instance_id.into_inner()))
                    .filter(migration_history::database_name.eq(&new_entry.record.database_name))
                    .select(diesel::dsl::max(migration_history::sequence))
                    .first(conn)?;
                let next_sequence = u64::try_from(last_sequence.unwrap_or(0))
                    .map_err(PipelineRepositoryError::persistence)?
                    + 1;

                let entry = MigrationHistory::from_new(new_entry, next_sequence);
                diesel::insert_into(migration_history::table)
                    .values(&to_history_row(&entry)?)
                    .execute(conn)?;
                Ok(Some(entry))
            })
        })
        .await
    }

    async fn list_migration_history(
        &self,
        instance_id: InstanceId,
        database_name: &str,
    ) -> PipelineRepositoryResult<Vec<MigrationHistory>> {
        let database = database_name.to_owned();
        self.run(move |connection| {
            migration_history::table
                .filter(migration_history::instance_id.eq(instance_id.into_inner()))
                .filter(migration_history::database_name.eq(database))
                .order(migration_history::sequence.asc())
                .select(MigrationHistoryRow::as_select())
                .load(connection)?
                .into_iter()
                .map(row_to_history)
                .collect()
        })
        .await
    }
}

fn update_status(
    connection: &mut PgConnection,
    task_id: TaskId,
    changeset: &TaskStatusChangeset,
) -> PipelineRepositoryResult<()> {
    let updated = diesel::update(tasks::table.find(task_id.into_inner()))
        .set(changeset)
        .execute(connection)?;
    if updated == 0 {
        return Err(PipelineRepositoryError::TaskNotFound(task_id));
    }
    Ok(())
}

fn load_pipelines(
    connection: &mut PgConnection,
    rows: Vec<PipelineRow>,
) -> PipelineRepositoryResult<Vec<Pipeline>> {
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let stage_rows = stages::table
        .filter(stages::pipeline_id.eq_any(&ids))
        .order(stages::position.asc())
        .select(StageRow::as_select())
        .load(connection)?;
    let task_rows = tasks::table
        .filter(tasks::pipeline_id.eq_any(&ids))
        .order(tasks::position.asc())
        .select(TaskRow::as_select())
        .load(connection)?;

    let mut tasks_by_stage: HashMap<Uuid, Vec<Task>> = HashMap::new();
    for row in task_rows {
        let stage_id = row.stage_id;
        tasks_by_stage
            .entry(stage_id)
            .or_default()
            .push(row_to_task(row)?);
    }

    let mut stages_by_pipeline: HashMap<Uuid, Vec<Stage>> = HashMap::new();
    for row in stage_rows {
        let pipeline_id = row.pipeline_id;
        let stage_tasks = tasks_by_stage.remove(&row.id).unwrap_or_default();
        stages_by_pipeline
            .entry(pipeline_id)
            .or_default()
            .push(row_to_stage(row, stage_tasks)?);
    }

    rows.into_iter()
        .map(|row| {
            let issue = row
                .issue_ref
                .map(IssueRef::new)
                .transpose()
                .map_err(PipelineRepositoryError::persistence)?;
            Ok(Pipeline::from_persisted(
                PipelineId::from_uuid(row.id),
                row.name,
                issue,
                stages_by_pipeline.remove(&row.id).unwrap_or_default(),
                row.created_at,
                row.updated_at,
            ))
        })
        .collect()
}

type PipelineRows = (PipelineRow, Vec<StageRow>, Vec<TaskRow>);

fn to_rows(pipeline: &Pipeline) -> PipelineRepositoryResult<PipelineRows> {
    let header = PipelineRow {
        id: pipeline.id().into_inner(),
        name: pipeline.name().to_owned(),
        issue_ref: pipeline.issue().map(|issue| issue.as_str().to_owned()),
        created_at: pipeline.created_at(),
        updated_at: pipeline.updated_at(),
    };

    let mut stage_rows = Vec::with_capacity(pipeline.stages().len());
    let mut task_rows = Vec::new();
    for (stage_position, stage) in pipeline.stages().iter().enumerate() {
        stage_rows.push(StageRow {
            id: stage.id().into_inner(),
            pipeline_id: pipeline.id().into_inner(),
            position: position(stage_position)?,
            name: stage.name().to_owned(),
            environment: stage.environment().as_str().to_owned(),
        });
        for (task_position, task) in stage.tasks().iter().enumerate() {
            task_rows.push(to_task_row(task, position(task_position)?)?);
        }
    }
    Ok((header, stage_rows, task_rows))
}

fn position(index: usize) -> PipelineRepositoryResult<i32> {
    i32::try_from(index).map_err(PipelineRepositoryError::persistence)
}

fn to_task_row(task: &Task, task_position: i32) -> PipelineRepositoryResult<TaskRow> {
    let changeset = to_changeset(task)?;
    Ok(TaskRow {
        id: task.id().into_inner(),
        pipeline_id: task.pipeline_id().into_inner(),
        stage_id: task.stage_id().into_inner(),
        position: task_position,
        name: task.name().to_owned(),
        instance_id: task.instance_id().into_inner(),
        database_id: task.database_id().map(DatabaseId::into_inner),
        task_type: task.task_type().as_str().to_owned(),
        payload: serde_json::to_value(task.payload())
            .map_err(PipelineRepositoryError::persistence)?,
        status: changeset.status,
        error: changeset.error,
        result: changeset.result,
        created_at: task.created_at(),
        started_at: changeset.started_at,
        completed_at: changeset.completed_at,
        updated_at: changeset.updated_at,
    })
}

fn to_changeset(task: &Task) -> PipelineRepositoryResult<TaskStatusChangeset> {
    Ok(TaskStatusChangeset {
        status: task.status().as_str().to_owned(),
        error: task
            .error()
            .map(serde_json::to_value)
            .transpose()
            .map_err(PipelineRepositoryError::persistence)?,
        result: task
            .result()
            .map(serde_json::to_value)
            .transpose()
            .map_err(PipelineRepositoryError::persistence)?,
        started_at: task.started_at(),
        completed_at: task.completed_at(),
        updated_at: task.updated_at(),
    })
}

fn row_to_stage(row: StageRow, stage_tasks: Vec<Task>) -> PipelineRepositoryResult<Stage> {
    let environment =
        EnvironmentName::new(row.environment).map_err(PipelineRepositoryError::persistence)?;
    Ok(Stage::from_persisted(
        StageId::from_uuid(row.id),
        PipelineId::from_uuid(row.pipeline_id),
        row.name,
        environment,
        stage_tasks,
    ))
}

fn row_to_task(row: TaskRow) -> PipelineRepositoryResult<Task> {
    let payload = serde_json::from_value::<TaskPayload>(row.payload)
        .map_err(PipelineRepositoryError::persistence)?;
    let stored_type =
        TaskType::try_from(row.task_type.as_str()).map_err(PipelineRepositoryError::persistence)?;
    debug_assert_eq!(stored_type, payload.task_type(), "task type column drifted from payload");
    let status =
        TaskStatus::try_from(row.status.as_str()).map_err(PipelineRepositoryError::persistence)?;
    let error = row
        .error
        .map(serde_json::from_value::<ExecutionError>)
        .transpose()
        .map_err(PipelineRepositoryError::persistence)?;
    let result = row
        .result
        .map(serde_json::from_value::<TaskResult>)
        .transpose()
        .map_err(PipelineRepositoryError::persistence)?;

    Ok(Task::from_persisted(PersistedTaskData {
        id: TaskId::from_uuid(row.id),
        pipeline_id: PipelineId::from_uuid(row.pipeline_id),
        stage_id: StageId::from_uuid(row.stage_id),
        name: row.name,
        instance_id: InstanceId::from_uuid(row.instance_id),
        database_id: row.database_id.map(DatabaseId::from_uuid),
        payload,
        status,
        error,
        result,
        created_at: row.created_at,
        started_at: row.started_at,
        completed_at: row.completed_at,
        updated_at: row.updated_at,
    }))
}

fn to_history_row(entry: &MigrationHistory) -> PipelineRepositoryResult<MigrationHistoryRow> {
    Ok(MigrationHistoryRow {
        id: entry.id,
        sequence: i64::try_from(entry.sequence).map_err(PipelineRepositoryError::persistence)?,
        task_id: entry.task_id.into_inner(),
        instance_id: entry.instance_id.into_inner(),
        database_name: entry.database.clone(),
        issue_ref: entry.issue_id.as_ref().map(|issue| issue.as_str().to_owned()),
        engine: entry.engine.as_str().to_owned(),
        migration_type: entry.migration_type.as_str().to_owned(),
        version: entry.version.clone(),
        description: entry.description.clone(),
        statement: entry.statement.clone(),
        execution_duration_ms: i64::try_from(entry.execution_duration_ms)
            .map_err(PipelineRepositoryError::persistence)?,
        payload: entry.payload.clone(),
        created_at: entry.created_at,
    })
}

fn row_to_history(row: MigrationHistoryRow) -> PipelineRepositoryResult<MigrationHistory> {
    Ok(MigrationHistory {
        id: row.id,
        sequence: u64::try_from(row.sequence).map_err(PipelineRepositoryError::persistence)?,
        task_id: TaskId::from_uuid(row.task_id),
        instance_id: InstanceId::from_uuid(row.instance_id),
        database: row.database_name,
        issue_id: row
            .issue_ref
            .map(IssueRef::new)
            .transpose()
            .map_err(PipelineRepositoryError::persistence)?,
        engine: MigrationEngine::try_from(row.engine.as_str())
            .map_err(PipelineRepositoryError::persistence)?,
        migration_type: MigrationType::try_from(row.migration_type.as_str())
            .map_err(PipelineRepositoryError::persistence)?,
        version: row.version,
        description: row.description,
        statement: row.statement,
        execution_duration_ms: u64::try_from(row.execution_duration_ms)
            .map_err(PipelineRepositoryError::persistence)?,
        payload: row.payload,
        created_at: row.created_at,
    })
}
