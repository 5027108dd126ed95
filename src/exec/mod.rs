// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running worker processes, using
//! `tokio::process::Command`, and turning whatever they do into a
//! [`WorkerOutcome`].
//!
//! - [`drain`] reads stdout and stderr concurrently so pipes never fill up.
//! - [`supervisor`] spawns a worker, enforces the time budget and handles
//!   cancellation.
//! - [`outcome`] is the terminal result of a supervised worker.
//! - [`process_table`] maps task ids to in-flight workers for out-of-band
//!   cancellation.

pub mod drain;
pub mod outcome;
pub mod process_table;
pub mod supervisor;

pub use drain::{DrainOutput, StderrTail, StreamDrain};
pub use outcome::{WorkerFailure, WorkerOutcome};
pub use process_table::{ProcessTable, WorkerHandle};
pub use supervisor::{SpawnedWorker, spawn_worker, supervise};
