// src/orchestrator/mod.rs

//! Task orchestrator facade.
//!
//! This ties together:
//! - the task registry (allocates ids, stores pollable status)
//! - the execution gate (single flight per gate name)
//! - the process supervisor (spawn, drain, timeout, kill)
//! - the process table (out-of-band cancellation by task id)
//!
//! `submit` does the cheap, synchronous part on the caller's thread (id
//! allocation, gate, spawn) and hands supervision to a background Tokio task,
//! so the caller gets a pollable id immediately.

pub mod class_spec;

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::ConfigFile;
use crate::exec::{ProcessTable, WorkerHandle, WorkerOutcome, spawn_worker, supervise};
use crate::gate::ExecutionGate;
use crate::protocol::{InvocationError, TaskParams};
use crate::registry::{StatusUpdate, TaskRegistry, TaskStatus};
use crate::types::{ErrorKind, TaskId, TaskState};

pub use class_spec::TaskClassSpec;

/// Error text recorded on a task that was cancelled.
pub const CANCEL_REASON: &str = "cancelled by user request";

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("unknown task class '{0}'")]
    UnknownClass(String),

    #[error("invalid task parameters: {0}")]
    InvalidParams(#[from] InvocationError),

    /// The gate was busy. The task was still recorded (as `FAILED`) and can
    /// be polled under `task_id`.
    #[error("another analysis holds gate '{gate}'; task {task_id} was rejected")]
    Conflict { task_id: TaskId, gate: String },

    /// The worker could not be started. Recorded as `FAILED` under `task_id`.
    #[error("failed to start worker for task {task_id}: {source}")]
    Spawn {
        task_id: TaskId,
        #[source]
        source: io::Error,
    },

    #[error("tasks can only be submitted from within a Tokio runtime")]
    NoRuntime,
}

impl SubmitError {
    /// Id of the task recorded for this rejection, if one was allocated.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            SubmitError::Conflict { task_id, .. } | SubmitError::Spawn { task_id, .. } => {
                Some(*task_id)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    pub stderr_tail_lines: usize,
    /// How long terminal tasks stay pollable; see [`Orchestrator::prune_finished`].
    pub retention: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            stderr_tail_lines: 20,
            retention: Duration::from_secs(60 * 60),
        }
    }
}

struct Inner {
    classes: BTreeMap<String, TaskClassSpec>,
    options: OrchestratorOptions,
    registry: TaskRegistry,
    gate: ExecutionGate,
    processes: ProcessTable,
}

/// Cheap to clone; all clones share the same registry, gates and workers.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("classes", &self.inner.classes.keys().collect::<Vec<_>>())
            .field("tasks", &self.inner.registry.len())
            .field("in_flight", &self.inner.processes.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(classes: impl IntoIterator<Item = TaskClassSpec>, options: OrchestratorOptions) -> Self {
        let classes = classes
            .into_iter()
            .map(|spec| (spec.class.clone(), spec))
            .collect();
        Self {
            inner: Arc::new(Inner {
                classes,
                options,
                registry: TaskRegistry::new(),
                gate: ExecutionGate::new(),
                processes: ProcessTable::new(),
            }),
        }
    }

    /// Build from a validated config. Relative worker paths are resolved
    /// against `base_dir` (normally the config file's directory).
    pub fn from_config(cfg: &ConfigFile, base_dir: &Path) -> Self {
        let options = OrchestratorOptions {
            stderr_tail_lines: cfg.worker.stderr_tail_lines,
            retention: cfg.registry.retention.as_duration(),
        };
        Self::new(TaskClassSpec::all_from_config(cfg, base_dir), options)
    }

    pub fn class(&self, name: &str) -> Option<&TaskClassSpec> {
        self.inner.classes.get(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &TaskClassSpec> {
        self.inner.classes.values()
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    pub fn gate(&self) -> &ExecutionGate {
        &self.inner.gate
    }

    /// Number of worker processes currently supervised.
    pub fn in_flight(&self) -> usize {
        self.inner.processes.len()
    }

    pub fn worker_pid(&self, task_id: &TaskId) -> Option<u32> {
        self.inner.processes.pid_of(task_id)
    }

    /// Submit a task of `class` and return its id without waiting for the
    /// worker.
    ///
    /// Rejections that happen after an id was allocated (`Conflict`,
    /// `Spawn`) are recorded as `FAILED` so the id stays pollable.
    pub fn submit(&self, class: &str, params: TaskParams) -> Result<TaskId, SubmitError> {
        let runtime = Handle::try_current().map_err(|_| SubmitError::NoRuntime)?;
        let spec = self
            .inner
            .classes
            .get(class)
            .ok_or_else(|| SubmitError::UnknownClass(class.to_string()))?;
        let invocation = spec.template.render(&params)?;

        let registry = &self.inner.registry;
        let task_id = registry.create(&spec.class);

        let Some(permit) = self.inner.gate.try_acquire(&spec.gate) else {
            warn!(
                task = %task_id,
                class = %spec.class,
                gate = %spec.gate,
                "gate busy; rejecting submission"
            );
            registry.set_status(
                &task_id,
                StatusUpdate::Failed {
                    error: format!("another analysis is already running (gate '{}')", spec.gate),
                    kind: ErrorKind::Conflict,
                },
            );
            return Err(SubmitError::Conflict {
                task_id,
                gate: spec.gate.clone(),
            });
        };

        let worker = match spawn_worker(task_id, &invocation, self.inner.options.stderr_tail_lines) {
            Ok(worker) => worker,
            Err(source) => {
                error!(
                    task = %task_id,
                    class = %spec.class,
                    error = %source,
                    "failed to start worker process"
                );
                registry.set_status(
                    &task_id,
                    StatusUpdate::Failed {
                        error: format!("failed to start worker: {source}"),
                        kind: ErrorKind::Spawn,
                    },
                );
                permit.release();
                return Err(SubmitError::Spawn { task_id, source });
            }
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.inner
            .processes
            .insert(task_id, WorkerHandle::new(worker.pid(), cancel_tx));
        registry.set_status(&task_id, StatusUpdate::InProgress);

        let inner = Arc::clone(&self.inner);
        let budget = spec.timeout;
        let result_field = spec.result_field.clone();
        runtime.spawn(async move {
            let outcome = supervise(worker, budget, result_field.as_deref(), cancel_rx).await;
            inner.record_outcome(&task_id, outcome);
            inner.processes.remove(&task_id);
            // Released only after the worker is gone and the outcome recorded.
            // If this future panics or is aborted the permit drops with it.
            drop(permit);
        });

        info!(
            task = %task_id,
            class = %spec.class,
            gate = %spec.gate,
            timeout = ?spec.timeout,
            "task submitted"
        );
        Ok(task_id)
    }

    /// Current status; `UNKNOWN` for ids never seen or already pruned.
    pub fn status(&self, task_id: &TaskId) -> TaskStatus {
        self.inner.registry.get(task_id)
    }

    /// Kill the worker running `task_id`.
    ///
    /// Returns `true` only if a live worker was found, the kill request was
    /// delivered, and the cancellation became the task's terminal state.
    /// Unknown and already-finished tasks return `false` and are untouched.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        let Some(handle) = self.inner.processes.remove(task_id) else {
            debug!(task = %task_id, "cancel: no in-flight worker");
            return false;
        };
        let pid = handle.pid();

        if !handle.signal() {
            debug!(task = %task_id, "cancel: worker already finished");
            return false;
        }

        let won = self.inner.registry.set_status(
            task_id,
            StatusUpdate::Cancelled {
                reason: CANCEL_REASON.to_string(),
            },
        );
        if won {
            warn!(task = %task_id, pid = ?pid, "task cancelled; worker process is being killed");
        } else {
            debug!(task = %task_id, "cancel lost the race against natural completion");
        }
        won
    }

    /// Remove terminal tasks older than the configured retention.
    ///
    /// Meant to be called periodically by a housekeeping job.
    pub fn prune_finished(&self) -> usize {
        let removed = self
            .inner
            .registry
            .prune_older_than(self.inner.options.retention);
        if removed > 0 {
            info!(removed, "pruned finished tasks");
        }
        removed
    }

    /// Poll `task_id` every `interval` until it is terminal (or unknown).
    pub async fn wait_for_terminal(&self, task_id: &TaskId, interval: Duration) -> TaskStatus {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let status = self.status(task_id);
            if status.is_terminal() || status.state == TaskState::Unknown {
                return status;
            }
        }
    }
}

impl Inner {
    fn record_outcome(&self, task_id: &TaskId, outcome: WorkerOutcome) {
        let update = match outcome {
            WorkerOutcome::Succeeded(result) => {
                let records = result.as_array().map(Vec::len);
                info!(task = %task_id, ?records, "task completed");
                StatusUpdate::Completed(result)
            }
            WorkerOutcome::Failed(failure) => {
                error!(task = %task_id, kind = ?failure.kind(), error = %failure, "task failed");
                StatusUpdate::Failed {
                    error: failure.to_string(),
                    kind: failure.kind(),
                }
            }
            WorkerOutcome::Cancelled => StatusUpdate::Cancelled {
                reason: CANCEL_REASON.to_string(),
            },
        };

        if !self.registry.set_status(task_id, update) {
            debug!(task = %task_id, "late worker outcome dropped; task already terminal");
        }
    }
}
