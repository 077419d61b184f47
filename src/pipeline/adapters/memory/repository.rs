//! In-memory pipeline repository for tests and single-process use.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::instance::domain::{DatabaseId, InstanceId};
use crate::pipeline::{
    domain::{
        IssueRef, MigrationHistory, NewMigrationHistory, Pipeline, PipelineId, Stage, StageId,
        Task, TaskId, TaskStatus, TaskType,
    },
    ports::{PipelineRepository, PipelineRepositoryError, PipelineRepositoryResult},
};

/// Thread-safe in-memory pipeline repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPipelineRepository {
    state: Arc<RwLock<InMemoryPipelineState>>,
}

#[derive(Debug, Default)]
struct InMemoryPipelineState {
    pipelines: HashMap<PipelineId, Pipeline>,
    insertion_order: Vec<PipelineId>,
    stage_index: HashMap<StageId, PipelineId>,
    task_index: HashMap<TaskId, PipelineId>,
    history: Vec<MigrationHistory>,
}

impl InMemoryPipelineRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(
        &self,
    ) -> PipelineRepositoryResult<std::sync::RwLockReadGuard<'_, InMemoryPipelineState>> {
        self.state.read().map_err(|err| {
            PipelineRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(
        &self,
    ) -> PipelineRepositoryResult<std::sync::RwLockWriteGuard<'_, InMemoryPipelineState>> {
        self.state.write().map_err(|err| {
            PipelineRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

impl InMemoryPipelineState {
    fn ordered(&self) -> impl Iterator<Item = &Pipeline> {
        self.insertion_order
            .iter()
            .filter_map(|id| self.pipelines.get(id))
    }

    fn pipeline_for_task(&self, id: TaskId) -> Option<&Pipeline> {
        self.task_index
            .get(&id)
            .and_then(|pipeline_id| self.pipelines.get(pipeline_id))
    }

    fn replace_task(&mut self, task: &Task) -> PipelineRepositoryResult<()> {
        let replaced = self
            .task_index
            .get(&task.id())
            .copied()
            .and_then(|pipeline_id| self.pipelines.get_mut(&pipeline_id))
            .is_some_and(|pipeline| pipeline.replace_task(task.clone()));
        if replaced {
            Ok(())
        } else {
            Err(PipelineRepositoryError::TaskNotFound(task.id()))
        }
    }
}

#[async_trait]
impl PipelineRepository for InMemoryPipelineRepository {
    async fn store(&self, pipeline: &Pipeline) -> PipelineRepositoryResult<()> {
        let mut state = self.write()?;
        if state.pipelines.contains_key(&pipeline.id()) {
            return Err(PipelineRepositoryError::DuplicatePipeline(pipeline.id()));
        }

        for stage in pipeline.stages() {
            state.stage_index.insert(stage.id(), pipeline.id());
            for task in stage.tasks() {
                state.task_index.insert(task.id(), pipeline.id());
            }
        }
        state.insertion_order.push(pipeline.id());
        state.pipelines.insert(pipeline.id(), pipeline.clone());
        Ok(())
    }

    async fn find_pipeline(&self, id: PipelineId) -> PipelineRepositoryResult<Option<Pipeline>> {
        let state = self.read()?;
        Ok(state.pipelines.get(&id).cloned())
    }

    async fn find_stage(&self, id: StageId) -> PipelineRepositoryResult<Option<Stage>> {
        let state = self.read()?;
        let stage = state
            .stage_index
            .get(&id)
            .and_then(|pipeline_id| state.pipelines.get(pipeline_id))
            .and_then(|pipeline| pipeline.stage(id))
            .cloned();
        Ok(stage)
    }

    async fn find_task(&self, id: TaskId) -> PipelineRepositoryResult<Option<Task>> {
        let state = self.read()?;
        Ok(state
            .pipeline_for_task(id)
            .and_then(|pipeline| pipeline.task(id))
            .cloned())
    }

    async fn list_pipelines_by_issue(
        &self,
        issue: &IssueRef,
    ) -> PipelineRepositoryResult<Vec<Pipeline>> {
        let state = self.read()?;
        Ok(state
            .ordered()
            .filter(|pipeline| pipeline.issue() == Some(issue))
            .cloned()
            .collect())
    }

    async fn list_active(&self) -> PipelineRepositoryResult<Vec<Pipeline>> {
        let state = self.read()?;
        Ok(state
            .ordered()
            .filter(|pipeline| {
                pipeline
                    .tasks()
                    .any(|task| matches!(task.status(), TaskStatus::Pending | TaskStatus::Running))
            })
            .cloned()
            .collect())
    }

    async fn list_tasks_by_status(
        &self,
        status: TaskStatus,
    ) -> PipelineRepositoryResult<Vec<Task>> {
        let state = self.read()?;
        Ok(state
            .ordered()
            .flat_map(Pipeline::tasks)
            .filter(|task| task.status() == status)
            .cloned()
            .collect())
    }

    async fn latest_task_for_database(
        &self,
        database_id: DatabaseId,
        task_type: TaskType,
    ) -> PipelineRepositoryResult<Option<Task>> {
        let state = self.read()?;
        Ok(state
            .ordered()
            .flat_map(Pipeline::tasks)
            .filter(|task| task.database_id() == Some(database_id) && task.task_type() == task_type)
            .max_by_key(|task| task.created_at())
            .cloned())
    }

    async fn update_task(&self, task: &Task) -> PipelineRepositoryResult<()> {
        let mut state = self.write()?;
        state.replace_task(task)
    }

    async fn record_outcome(
        &self,
        task: &Task,
        history: Option<NewMigrationHistory>,
    ) -> PipelineRepositoryResult<Option<MigrationHistory>> {
        let mut state = self.write()?;
        if state.pipeline_for_task(task.id()).is_none() {
            return Err(PipelineRepositoryError::TaskNotFound(task.id()));
        }

        let entry = match history {
            Some(new_entry) => {
                if state
                    .history
                    .iter()
                    .any(|existing| existing.task_id == new_entry.task_id)
                {
                    return Err(PipelineRepositoryError::DuplicateHistory(new_entry.task_id));
                }
                let last_sequence = state
                    .history
                    .iter()
                    .filter(|existing| {
                        existing.instance_id == new_entry.instance_id
                            && existing.database == new_entry.record.database_name
                    })
                    .map(|existing| existing.sequence)
                    .max()
                    .unwrap_or(0);
                Some(MigrationHistory::from_new(new_entry, last_sequence + 1))
            }
            None => None,
        };

        state.replace_task(task)?;
        if let Some(recorded) = &entry {
            state.history.push(recorded.clone());
        }
        Ok(entry)
    }

    async fn list_migration_history(
        &self,
        instance_id: InstanceId,
        database_name: &str,
    ) -> PipelineRepositoryResult<Vec<MigrationHistory>> {
        let state = self.read()?;
        let mut entries: Vec<MigrationHistory> = state
            .history
            .iter()
            .filter(|entry| entry.instance_id == instance_id && entry.database == database_name)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.sequence);
        Ok(entries)
    }
}
