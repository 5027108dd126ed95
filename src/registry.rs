// src/registry.rs

//! In-memory task status store.
//!
//! Every read clones a whole [`TaskStatus`] under the lock, so a poller never
//! sees a half-applied update. Transitions are monotonic (see
//! [`TaskState::can_transition_to`]); once a task is terminal every further
//! update is dropped and reported as `false`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::types::{ErrorKind, TaskId, TaskState};

/// Snapshot of one task as returned to pollers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskStatus {
    fn pending(task_id: TaskId, class: &str) -> Self {
        Self {
            task_id,
            state: TaskState::Pending,
            class: Some(class.to_string()),
            result: None,
            error: None,
            error_kind: None,
            created_at: Some(Utc::now()),
            started_at: None,
            finished_at: None,
        }
    }

    /// What a read returns for an id the registry does not hold.
    pub fn unknown(task_id: TaskId) -> Self {
        Self {
            task_id,
            state: TaskState::Unknown,
            class: None,
            result: None,
            error: None,
            error_kind: None,
            created_at: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// A requested state change. Each variant carries exactly the data its
/// target state allows: a result only on completion, an error only on
/// failure or cancellation.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    InProgress,
    Completed(Value),
    Failed { error: String, kind: ErrorKind },
    Cancelled { reason: String },
}

impl StatusUpdate {
    pub fn state(&self) -> TaskState {
        match self {
            StatusUpdate::InProgress => TaskState::InProgress,
            StatusUpdate::Completed(_) => TaskState::Completed,
            StatusUpdate::Failed { .. } => TaskState::Failed,
            StatusUpdate::Cancelled { .. } => TaskState::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<TaskId, TaskStatus>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TaskId, TaskStatus>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TaskId, TaskStatus>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a new `PENDING` task for `class`.
    pub fn create(&self, class: &str) -> TaskId {
        let task_id = TaskId::new();
        self.write()
            .insert(task_id, TaskStatus::pending(task_id, class));
        debug!(task = %task_id, class = %class, "task created");
        task_id
    }

    /// Apply `update` if the transition is allowed.
    ///
    /// Returns `false` for unknown ids and for updates that would leave a
    /// terminal state or move backwards; such updates have no effect.
    pub fn set_status(&self, task_id: &TaskId, update: StatusUpdate) -> bool {
        let mut tasks = self.write();
        let Some(status) = tasks.get_mut(task_id) else {
            debug!(task = %task_id, "status update for unknown task dropped");
            return false;
        };

        let next = update.state();
        if !status.state.can_transition_to(next) {
            debug!(
                task = %task_id,
                current = %status.state,
                requested = %next,
                "status update dropped"
            );
            return false;
        }

        let now = Utc::now();
        status.state = next;
        match update {
            StatusUpdate::InProgress => status.started_at = Some(now),
            StatusUpdate::Completed(result) => {
                status.result = Some(result);
                status.finished_at = Some(now);
            }
            StatusUpdate::Failed { error, kind } => {
                status.error = Some(error);
                status.error_kind = Some(kind);
                status.finished_at = Some(now);
            }
            StatusUpdate::Cancelled { reason } => {
                status.error = Some(reason);
                status.error_kind = Some(ErrorKind::Cancelled);
                status.finished_at = Some(now);
            }
        }

        debug!(task = %task_id, state = %next, "task status updated");
        true
    }

    /// Current snapshot, or an `UNKNOWN` status for ids not held.
    pub fn get(&self, task_id: &TaskId) -> TaskStatus {
        self.read()
            .get(task_id)
            .cloned()
            .unwrap_or_else(|| TaskStatus::unknown(*task_id))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop terminal tasks that finished before `cutoff`. Returns how many
    /// were removed. Non-terminal tasks are never removed.
    pub fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut tasks = self.write();
        let before = tasks.len();
        tasks.retain(|_, status| {
            !(status.is_terminal() && status.finished_at.is_some_and(|t| t < cutoff))
        });
        before - tasks.len()
    }

    /// Drop terminal tasks that finished more than `retention` ago.
    pub fn prune_older_than(&self, retention: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        match cutoff {
            Some(cutoff) => self.prune_finished_before(cutoff),
            None => 0,
        }
    }
}
