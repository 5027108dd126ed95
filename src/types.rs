// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier allocated for every submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        TaskId(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        TaskId::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(TaskId)
            .map_err(|e| format!("invalid task id '{s}': {e}"))
    }
}

/// Lifecycle state of a task as seen by pollers.
///
/// `Unknown` is never stored; it is what a status read returns for an id
/// the registry does not hold (never allocated, or already pruned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Whether a stored task may move from `self` to `next`.
    ///
    /// Transitions only move forward: `Pending -> InProgress -> terminal`,
    /// or straight from `Pending` to a terminal state. Nothing leaves a
    /// terminal state.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        match (self, next) {
            (_, TaskState::Unknown) | (TaskState::Unknown, _) => false,
            (current, _) if current.is_terminal() => false,
            (TaskState::Pending, TaskState::Pending) => false,
            (TaskState::Pending, _) => true,
            (TaskState::InProgress, next) => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::InProgress => "IN_PROGRESS",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
            TaskState::Cancelled => "CANCELLED",
            TaskState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(TaskState::Pending),
            "IN_PROGRESS" => Ok(TaskState::InProgress),
            "COMPLETED" => Ok(TaskState::Completed),
            "FAILED" => Ok(TaskState::Failed),
            "CANCELLED" => Ok(TaskState::Cancelled),
            "UNKNOWN" => Ok(TaskState::Unknown),
            other => Err(format!("invalid task state: {other}")),
        }
    }
}

/// Why a task ended in `FAILED` or `CANCELLED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The execution gate was already held.
    Conflict,
    /// The worker process could not be started.
    Spawn,
    /// Non-zero exit code.
    Crash,
    /// Exit 0 but stdout was empty or not the expected JSON shape.
    Protocol,
    /// Exit 0 with an explicit `error` field in the document.
    Worker,
    /// Wall-clock budget exceeded.
    Timeout,
    /// I/O failure while waiting on or reading from the worker.
    Io,
    /// External cancellation request.
    Cancelled,
}
