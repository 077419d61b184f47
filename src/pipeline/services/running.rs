//! Bookkeeping for tasks this process is currently executing.

use crate::pipeline::domain::{TargetKey, TaskId};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct RunningTask {
    target: TargetKey,
    cancel: CancellationToken,
    abort: Option<AbortHandle>,
}

/// Running tasks keyed by identifier.
#[derive(Debug, Default)]
pub(super) struct RunningTasks {
    tasks: Mutex<HashMap<TaskId, RunningTask>>,
}

impl RunningTasks {
    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, RunningTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn insert(&self, task_id: TaskId, target: TargetKey, cancel: CancellationToken) {
        self.lock().insert(
            task_id,
            RunningTask {
                target,
                cancel,
                abort: None,
            },
        );
    }

    pub(super) fn attach_abort(&self, task_id: TaskId, abort: AbortHandle) {
        if let Some(running) = self.lock().get_mut(&task_id) {
            running.abort = Some(abort);
        }
    }

    pub(super) fn remove(&self, task_id: TaskId) {
        self.lock().remove(&task_id);
    }

    pub(super) fn contains(&self, task_id: TaskId) -> bool {
        self.lock().contains_key(&task_id)
    }

    pub(super) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(super) fn targets(&self) -> HashSet<TargetKey> {
        self.lock().values().map(|running| running.target).collect()
    }

    /// Signals cancellation, returning `false` when the task is not running
    /// here.
    pub(super) fn cancel(&self, task_id: TaskId) -> bool {
        self.lock().get(&task_id).is_some_and(|running| {
            running.cancel.cancel();
            true
        })
    }

    /// Aborts every executor, returning how many were aborted.
    pub(super) fn abort_all(&self) -> usize {
        self.lock()
            .values()
            .filter_map(|running| running.abort.as_ref())
            .inspect(|abort| abort.abort())
            .count()
    }
}
