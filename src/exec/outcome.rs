// src/exec/outcome.rs

use std::io;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::config::HumanDuration;
use crate::protocol::ProtocolError;
use crate::types::ErrorKind;

/// Terminal result of supervising one worker process.
#[derive(Debug)]
pub enum WorkerOutcome {
    /// Exit 0 with a well-formed document; carries the extracted payload.
    Succeeded(Value),
    /// Crash, protocol violation, timeout or I/O failure.
    Failed(WorkerFailure),
    /// Killed because of an external cancellation request.
    Cancelled,
}

impl WorkerOutcome {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WorkerOutcome::Failed(WorkerFailure::Timeout(_)))
    }
}

#[derive(Debug, Error)]
pub enum WorkerFailure {
    #[error("worker exited abnormally ({}){}", describe_exit(.exit_code), describe_tail(.stderr_tail))]
    Crash {
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("worker timed out after {} and was killed", describe_budget(.0))]
    Timeout(Duration),

    #[error("I/O failure while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl WorkerFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerFailure::Crash { .. } => ErrorKind::Crash,
            WorkerFailure::Protocol(ProtocolError::WorkerReported(_)) => ErrorKind::Worker,
            WorkerFailure::Protocol(_) => ErrorKind::Protocol,
            WorkerFailure::Timeout(_) => ErrorKind::Timeout,
            WorkerFailure::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn io(context: &'static str, source: io::Error) -> Self {
        WorkerFailure::Io { context, source }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit={code}"),
        None => "terminated by signal".to_string(),
    }
}

fn describe_budget(budget: &Duration) -> HumanDuration {
    HumanDuration::from(*budget)
}

fn describe_tail(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!("; stderr tail:\n{tail}")
    }
}
