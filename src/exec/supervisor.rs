// src/exec/supervisor.rs

//! Supervision of a single worker process.
//!
//! Per invocation the worker goes through:
//!
//! - *starting*: [`spawn_worker`] launches the process and attaches the
//!   stream drain before anything else can happen;
//! - *running*: [`supervise`] waits for exit + drain, bounded by the
//!   caller-supplied budget, while listening for a cancellation request;
//! - a terminal [`WorkerOutcome`]: succeeded, failed (crash, protocol
//!   violation, timeout, I/O) or cancelled.
//!
//! On timeout and cancellation the worker's whole process group is killed and
//! the worker reaped before the outcome is returned. After a normal exit the
//! group is swept too, so nothing the worker forked outlives supervision.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::exec::drain::{DrainOutput, StreamDrain};
use crate::exec::outcome::{WorkerFailure, WorkerOutcome};
use crate::protocol::{Invocation, parse_payload};
use crate::types::TaskId;

/// A worker process that has been started and has its drain attached.
#[derive(Debug)]
pub struct SpawnedWorker {
    task_id: TaskId,
    child: Child,
    drain: StreamDrain,
}

impl SpawnedWorker {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Start the worker described by `invocation` and attach the stream drain.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_worker(
    task_id: TaskId,
    invocation: &Invocation,
    stderr_tail_lines: usize,
) -> io::Result<SpawnedWorker> {
    info!(
        task = %task_id,
        cmd = %invocation.display(),
        cwd = ?invocation.working_dir,
        "starting worker process"
    );

    let mut child = invocation.command().spawn()?;
    let drain = match StreamDrain::attach(&mut child, task_id, stderr_tail_lines) {
        Ok(drain) => drain,
        Err(e) => {
            // kill_on_drop reaps the child once it goes out of scope.
            let _ = child.start_kill();
            return Err(e);
        }
    };

    debug!(task = %task_id, pid = ?child.id(), "worker process started");

    Ok(SpawnedWorker {
        task_id,
        child,
        drain,
    })
}

enum Exit {
    Finished(io::Result<ExitStatus>, io::Result<DrainOutput>),
    TimedOut,
    Cancelled,
}

/// Drive a spawned worker to a terminal outcome.
///
/// - `budget` bounds the wait for process exit *and* for both streams to
///   close; expiry kills the process and yields a timeout failure.
/// - A message on `cancel_rx` kills the process and yields `Cancelled`.
///   Dropping the sender without sending is not a cancellation.
/// - `result_field` selects the payload out of object-shaped documents.
pub async fn supervise(
    worker: SpawnedWorker,
    budget: Duration,
    result_field: Option<&str>,
    mut cancel_rx: oneshot::Receiver<()>,
) -> WorkerOutcome {
    let SpawnedWorker {
        task_id,
        mut child,
        mut drain,
    } = worker;

    // The worker leads its own group (see `Invocation::command`).
    let pgid = child.id();
    debug!(task = %task_id, ?budget, ?pgid, "worker running");

    let exit = {
        let run = async {
            let status = child.wait().await;
            let output = drain.collect().await;
            (status, output)
        };

        tokio::select! {
            finished = tokio::time::timeout(budget, run) => match finished {
                Ok((status, output)) => Exit::Finished(status, output),
                Err(_) => Exit::TimedOut,
            },
            Ok(()) = &mut cancel_rx => Exit::Cancelled,
        }
    };

    match exit {
        Exit::Finished(status, output) => {
            kill_process_group(task_id, pgid);
            classify(task_id, status, output, result_field)
        }
        Exit::TimedOut => {
            warn!(task = %task_id, ?budget, "worker exceeded its time budget; killing process");
            terminate(task_id, pgid, &mut child, &drain).await;
            WorkerOutcome::Failed(WorkerFailure::Timeout(budget))
        }
        Exit::Cancelled => {
            info!(task = %task_id, "cancellation requested for running worker; killing process");
            terminate(task_id, pgid, &mut child, &drain).await;
            WorkerOutcome::Cancelled
        }
    }
}

/// Kill the worker's process group, wait for the OS to reap the worker, and
/// stop the readers.
async fn terminate(task_id: TaskId, pgid: Option<u32>, child: &mut Child, drain: &StreamDrain) {
    kill_process_group(task_id, pgid);
    if let Err(e) = child.kill().await {
        warn!(task = %task_id, error = %e, "failed to kill worker process");
    }
    drain.abort();
    debug!(task = %task_id, "worker process terminated");
}

/// SIGKILL every process left in the worker's group. A group that is already
/// empty is not an error.
#[cfg(unix)]
fn kill_process_group(task_id: TaskId, pgid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pgid) = pgid.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) => debug!(task = %task_id, pgid, "worker process group killed"),
        Err(Errno::ESRCH) => {}
        Err(e) => warn!(task = %task_id, pgid, error = %e, "failed to kill worker process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_task_id: TaskId, _pgid: Option<u32>) {}

fn classify(
    task_id: TaskId,
    status: io::Result<ExitStatus>,
    output: io::Result<DrainOutput>,
    result_field: Option<&str>,
) -> WorkerOutcome {
    let status = match status {
        Ok(status) => status,
        Err(e) => return WorkerOutcome::Failed(WorkerFailure::io("waiting for worker exit", e)),
    };
    let output = match output {
        Ok(output) => output,
        Err(e) => return WorkerOutcome::Failed(WorkerFailure::io("reading worker output", e)),
    };

    info!(
        task = %task_id,
        exit_code = ?status.code(),
        success = status.success(),
        stdout_bytes = output.stdout.len(),
        "worker process exited"
    );

    if !status.success() {
        return WorkerOutcome::Failed(WorkerFailure::Crash {
            exit_code: status.code(),
            stderr_tail: output.stderr_tail.to_string(),
        });
    }

    match parse_payload(&output.stdout, result_field) {
        Ok(payload) => WorkerOutcome::Succeeded(payload),
        Err(e) => {
            warn!(task = %task_id, error = %e, "worker output rejected");
            WorkerOutcome::Failed(WorkerFailure::Protocol(e))
        }
    }
}
