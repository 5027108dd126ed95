// src/protocol/mod.rs

//! Worker invocation protocol.
//!
//! A worker is an external process that reads its arguments, writes exactly
//! one JSON document to stdout, writes diagnostics to stderr, and exits 0 on
//! success.
//!
//! - [`params`] holds the request parameters and their validation.
//! - [`invocation`] renders parameters into argv / cwd / env.
//! - [`output`] decodes the stdout document into a result or a failure.

pub mod invocation;
pub mod output;
pub mod params;

pub use invocation::{Invocation, InvocationTemplate};
pub use output::{ProtocolError, WorkerOutput, parse_payload};
pub use params::{InvocationError, TaskParams};
