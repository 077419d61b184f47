//! Stage entity and derived stage status.

use super::{PipelineDomainError, PipelineId, StageId, Task, TaskId, TaskSpec, TaskStatus};
use crate::instance::domain::EnvironmentName;
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a stage, derived from its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    /// No task has started.
    Pending,
    /// Work is in progress or partially complete.
    Running,
    /// Every task is done.
    Done,
    /// A task failed and nothing is still running.
    Failed,
    /// A task was canceled and nothing failed or is still running.
    Canceled,
}

impl StageStatus {
    /// Returns the canonical representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Derives a stage status from its task statuses.
    #[must_use]
    pub fn derive(statuses: impl IntoIterator<Item = TaskStatus> + Clone) -> Self {
        let has = |wanted: TaskStatus| statuses.clone().into_iter().any(|status| status == wanted);
        if statuses.clone().into_iter().all(|status| status == TaskStatus::Done) {
            Self::Done
        } else if has(TaskStatus::Running) {
            Self::Running
        } else if has(TaskStatus::Failed) {
            Self::Failed
        } else if has(TaskStatus::Canceled) {
            Self::Canceled
        } else if has(TaskStatus::Done) {
            Self::Running
        } else {
            Self::Pending
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of a stage inside a new pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    /// Display name.
    pub name: String,
    /// Environment the stage deploys to.
    pub environment: EnvironmentName,
    /// Tasks in declared order.
    pub tasks: Vec<TaskSpec>,
}

/// Ordered group of tasks within a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    id: StageId,
    pipeline_id: PipelineId,
    name: String,
    environment: EnvironmentName,
    tasks: Vec<Task>,
}

impl Stage {
    /// Creates a stage of pending tasks from its declaration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::EmptyName`] for a blank name,
    /// [`PipelineDomainError::EmptyStage`] when no tasks are declared, or any
    /// task construction error.
    pub fn new(
        pipeline_id: PipelineId,
        spec: StageSpec,
        clock: &impl Clock,
    ) -> Result<Self, PipelineDomainError> {
        let name = spec.name.trim().to_owned();
        if name.is_empty() {
            return Err(PipelineDomainError::EmptyName("stage"));
        }
        if spec.tasks.is_empty() {
            return Err(PipelineDomainError::EmptyStage(name));
        }

        let id = StageId::new();
        let tasks = spec
            .tasks
            .into_iter()
            .map(|task| Task::new(pipeline_id, id, task, clock))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id,
            pipeline_id,
            name,
            environment: spec.environment,
            tasks,
        })
    }

    /// Reconstructs a stage from persisted storage.
    #[must_use]
    pub const fn from_persisted(
        id: StageId,
        pipeline_id: PipelineId,
        name: String,
        environment: EnvironmentName,
        tasks: Vec<Task>,
    ) -> Self {
        Self {
            id,
            pipeline_id,
            name,
            environment,
            tasks,
        }
    }

    /// Returns the stage identifier.
    #[must_use]
    pub const fn id(&self) -> StageId {
        self.id
    }

    /// Returns the owning pipeline.
    #[must_use]
    pub const fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the target environment.
    #[must_use]
    pub const fn environment(&self) -> &EnvironmentName {
        &self.environment
    }

    /// Returns the tasks in declared order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Finds a task by identifier.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id() == id)
    }

    /// Finds a task by identifier for mutation.
    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id() == id)
    }

    /// Returns the derived status.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        StageStatus::derive(self.tasks.iter().map(Task::status))
    }

    /// Returns whether the stage has a failed or canceled task, which blocks
    /// further dispatch in this stage.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.tasks
            .iter()
            .any(|task| matches!(task.status(), TaskStatus::Failed | TaskStatus::Canceled))
    }
}
