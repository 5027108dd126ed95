// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod gate;
pub mod logging;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod types;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command, RunArgs};
use crate::config::loader::load_and_validate;
use crate::orchestrator::Orchestrator;
use crate::registry::TaskStatus;
use crate::types::TaskState;

pub use crate::orchestrator::SubmitError;
pub use crate::protocol::TaskParams;
pub use crate::types::TaskId;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the orchestrator (registry, gates, supervisor)
/// - status polling
/// - Ctrl-C handling (cancels the running task)
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    let orchestrator = Orchestrator::from_config(&cfg, &config_root_dir(&config_path));

    match args.command {
        Command::Check => {
            print_classes(&orchestrator);
            Ok(())
        }
        Command::Run(run_args) => run_task(&orchestrator, &run_args).await,
    }
}

async fn run_task(orchestrator: &Orchestrator, args: &RunArgs) -> Result<()> {
    let task_id = match orchestrator.submit(&args.class, args.params()) {
        Ok(task_id) => task_id,
        Err(err) => {
            if let Some(task_id) = err.task_id() {
                print_status(&orchestrator.status(&task_id))?;
            }
            return Err(err).context("submitting task");
        }
    };

    info!(task = %task_id, class = %args.class, "polling task status");
    let interval = Duration::from_millis(args.poll_interval_ms.max(10));

    let status = tokio::select! {
        status = orchestrator.wait_for_terminal(&task_id, interval) => status,
        res = tokio::signal::ctrl_c() => {
            res.context("listening for Ctrl+C")?;
            warn!(task = %task_id, "Ctrl+C received; cancelling task");
            orchestrator.cancel(&task_id);
            orchestrator.wait_for_terminal(&task_id, interval).await
        }
    };

    print_status(&status)?;

    if status.state != TaskState::Completed {
        bail!(
            "task {task_id} ended as {}: {}",
            status.state,
            status.error.as_deref().unwrap_or("no error message")
        );
    }
    Ok(())
}

/// Directory that relative `[worker].working_dir` values are resolved against.
///
/// - If the config path has a non-empty parent (e.g. "conf/Taskpoll.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Taskpoll.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn print_status(status: &TaskStatus) -> Result<()> {
    let doc = serde_json::to_string_pretty(status).context("serializing task status")?;
    println!("{doc}");
    Ok(())
}

/// Simple `check` output: print classes, gates, budgets and commands.
fn print_classes(orchestrator: &Orchestrator) {
    println!("taskpoll config check");
    println!();

    let classes: Vec<_> = orchestrator.classes().collect();
    println!("task classes ({}):", classes.len());
    for spec in classes {
        let tpl = &spec.template;
        println!("  - {}", spec.class);
        println!("      gate: {}", spec.gate);
        println!("      timeout: {:?}", spec.timeout);
        println!("      cmd: {} {} {}", tpl.program, tpl.program_args.join(" "), tpl.script);
        if !tpl.fixed_args.is_empty() {
            println!("      fixed_args: {:?}", tpl.fixed_args);
        }
        if let Some(ref field) = spec.result_field {
            println!("      result_field: {field}");
        }
        if let Some(workers) = tpl.workers {
            println!("      workers: {workers}");
        }
        if let Some(ref dir) = tpl.working_dir {
            println!("      working_dir: {}", dir.display());
        }
    }

    debug!("config check complete (no execution)");
}
