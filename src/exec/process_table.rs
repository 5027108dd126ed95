// src/exec/process_table.rs

//! Lookup table of in-flight workers, keyed by task id.
//!
//! The supervising future owns the OS process; the table only holds what an
//! unrelated caller needs to stop it: the pid (for logs) and a one-shot kill
//! request. Whoever removes an entry owns it, so the natural-completion path
//! and the cancel path can never both act on the same handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::types::TaskId;

/// Handle for a currently-running worker process.
#[derive(Debug)]
pub struct WorkerHandle {
    pid: Option<u32>,
    cancel: oneshot::Sender<()>,
}

impl WorkerHandle {
    pub fn new(pid: Option<u32>, cancel: oneshot::Sender<()>) -> Self {
        Self { pid, cancel }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the supervisor to kill the process.
    ///
    /// Returns `false` if the supervisor already stopped listening, i.e. the
    /// worker finished on its own.
    pub fn signal(self) -> bool {
        self.cancel.send(()).is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    inner: Arc<Mutex<HashMap<TaskId, WorkerHandle>>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, WorkerHandle>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a handle; returns the previous handle for the same id, if any.
    pub fn insert(&self, task_id: TaskId, handle: WorkerHandle) -> Option<WorkerHandle> {
        self.lock().insert(task_id, handle)
    }

    /// Take ownership of a handle. At most one caller ever gets `Some`.
    pub fn remove(&self, task_id: &TaskId) -> Option<WorkerHandle> {
        self.lock().remove(task_id)
    }

    pub fn pid_of(&self, task_id: &TaskId) -> Option<u32> {
        self.lock().get(task_id).and_then(WorkerHandle::pid)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_is_removed_exactly_once() {
        let table = ProcessTable::new();
        let id = TaskId::new();
        let (tx, _rx) = oneshot::channel();
        table.insert(id, WorkerHandle::new(Some(4242), tx));

        assert_eq!(table.pid_of(&id), Some(4242));
        assert!(table.remove(&id).is_some());
        assert!(table.remove(&id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn signal_reports_whether_the_supervisor_was_listening() {
        let (tx, rx) = oneshot::channel();
        assert!(WorkerHandle::new(None, tx).signal());
        drop(rx);

        let (tx, rx) = oneshot::channel::<()>();
        drop(rx);
        assert!(!WorkerHandle::new(None, tx).signal());
    }
}
