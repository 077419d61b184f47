//! Pipeline aggregate root.

use super::{
    IssueRef, PipelineDomainError, PipelineId, Stage, StageId, StageSpec, StageStatus, Task,
    TaskId,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a pipeline, derived from its stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    /// Nothing has started.
    Pending,
    /// Some stage is in progress.
    Running,
    /// Every stage is done.
    Done,
    /// A stage failed.
    Failed,
    /// A stage was canceled.
    Canceled,
}

impl PipelineStatus {
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
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of a new pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    /// Display name.
    pub name: String,
    /// Issue the pipeline belongs to, if any.
    pub issue: Option<IssueRef>,
    /// Stages in execution order.
    pub stages: Vec<StageSpec>,
}

/// Ordered list of stages rolled out one after another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    id: PipelineId,
    name: String,
    issue: Option<IssueRef>,
    stages: Vec<Stage>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Pipeline {
    /// Builds a pipeline of pending tasks from its declaration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::EmptyName`] for a blank name,
    /// [`PipelineDomainError::NoStages`] when no stages are declared, or any
    /// stage construction error.
    pub fn new(spec: PipelineSpec, clock: &impl Clock) -> Result<Self, PipelineDomainError> {
        let name = spec.name.trim().to_owned();
        if name.is_empty() {
            return Err(PipelineDomainError::EmptyName("pipeline"));
        }
        if spec.stages.is_empty() {
            return Err(PipelineDomainError::NoStages);
        }

        let id = PipelineId::new();
        let stages = spec
            .stages
            .into_iter()
            .map(|stage| Stage::new(id, stage, clock))
            .collect::<Result<Vec<_>, _>>()?;
        let timestamp = clock.utc();

        Ok(Self {
            id,
            name,
            issue: spec.issue,
            stages,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Reconstructs a pipeline from persisted storage.
    #[must_use]
    pub const fn from_persisted(
        id: PipelineId,
        name: String,
        issue: Option<IssueRef>,
        stages: Vec<Stage>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            issue,
            stages,
            created_at,
            updated_at,
        }
    }

    /// Returns the pipeline identifier.
    #[must_use]
    pub const fn id(&self) -> PipelineId {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the issue reference, if any.
    #[must_use]
    pub const fn issue(&self) -> Option<&IssueRef> {
        self.issue.as_ref()
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest change timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns every task across all stages.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.stages.iter().flat_map(Stage::tasks)
    }

    /// Finds a stage by identifier.
    #[must_use]
    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.id() == id)
    }

    /// Finds a task by identifier.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.stages.iter().find_map(|stage| stage.task(id))
    }

    /// Finds a task by identifier for mutation.
    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.stages.iter_mut().find_map(|stage| stage.task_mut(id))
    }

    /// Replaces a stored task with an updated copy.
    ///
    /// Returns `false` when the task is not part of this pipeline.
    pub fn replace_task(&mut self, task: Task) -> bool {
        let updated_at = task.updated_at();
        let Some(slot) = self.task_mut(task.id()) else {
            return false;
        };
        *slot = task;
        self.updated_at = updated_at;
        true
    }

    /// Returns the first stage that is not done.
    ///
    /// Only this stage may have tasks dispatched; every earlier stage is
    /// done.
    #[must_use]
    pub fn active_stage(&self) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|stage| stage.status() != StageStatus::Done)
    }

    /// Returns the derived status.
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        let Some(active) = self.active_stage() else {
            return PipelineStatus::Done;
        };
        match active.status() {
            StageStatus::Failed => PipelineStatus::Failed,
            StageStatus::Canceled => PipelineStatus::Canceled,
            StageStatus::Pending if self.stages.first().map(Stage::id) == Some(active.id()) => {
                PipelineStatus::Pending
            }
            StageStatus::Pending | StageStatus::Running | StageStatus::Done => {
                PipelineStatus::Running
            }
        }
    }
}
