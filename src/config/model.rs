// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::duration::HumanDuration;

/// Environment variable forced on every worker so it writes UTF-8 text.
pub const UTF8_ENV: (&str, &str) = ("PYTHONIOENCODING", "utf-8");

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [worker]
/// program = "python3"
/// working_dir = "python"
/// default_timeout = "180s"
///
/// [registry]
/// retention = "1h"
///
/// [task.chart_pattern]
/// script = "stock/py/find_chart_patterns.py"
/// gate = "python"
/// workers = 0
///
/// [task.similar]
/// script = "stock/py/find_similar_full.py"
/// gate = "python"
/// result_field = "similar_stocks"
/// flags = { start = "--start_date", end = "--end_date", symbol = "--base_symbol", limit = "--n_similar" }
/// ```
///
/// This is the unvalidated form; see [`ConfigFile`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// How workers are launched, from `[worker]`.
    #[serde(default)]
    pub worker: WorkerSection,

    /// Status store housekeeping, from `[registry]`.
    #[serde(default)]
    pub registry: RegistrySection,

    /// All task classes from `[task.<class>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskClassConfig>,
}

/// Validated configuration. Obtain one through `ConfigFile::try_from`
/// or [`crate::config::load_and_validate`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub worker: WorkerSection,
    pub registry: RegistrySection,
    pub task: BTreeMap<String, TaskClassConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        worker: WorkerSection,
        registry: RegistrySection,
        task: BTreeMap<String, TaskClassConfig>,
    ) -> Self {
        Self {
            worker,
            registry,
            task,
        }
    }

    /// Effective wall-clock budget for a task class.
    pub fn timeout_for(&self, class: &str) -> Option<Duration> {
        self.task
            .get(class)
            .map(|t| t.effective_timeout(self.worker.default_timeout))
    }
}

/// `[worker]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    /// Executable used to launch every worker script.
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed between `program` and the script path.
    #[serde(default = "default_program_args")]
    pub program_args: Vec<String>,

    /// Directory workers run in, so their relative data paths resolve.
    ///
    /// Relative values are resolved against the config file's directory.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Extra environment for the worker; merged over [`UTF8_ENV`].
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default = "default_timeout")]
    pub default_timeout: HumanDuration,

    /// How many trailing stderr lines to keep for failure messages.
    #[serde(default = "default_stderr_tail_lines")]
    pub stderr_tail_lines: usize,
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_program_args() -> Vec<String> {
    vec!["-u".to_string()]
}

fn default_timeout() -> HumanDuration {
    HumanDuration::from_secs(180)
}

fn default_stderr_tail_lines() -> usize {
    20
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            program_args: default_program_args(),
            working_dir: None,
            env: BTreeMap::new(),
            default_timeout: default_timeout(),
            stderr_tail_lines: default_stderr_tail_lines(),
        }
    }
}

impl WorkerSection {
    /// Environment overrides with the UTF-8 default applied underneath.
    pub fn effective_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(UTF8_ENV.0.to_string(), UTF8_ENV.1.to_string());
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// Working directory resolved against `base` (the config file's dir).
    pub fn resolved_working_dir(&self, base: &Path) -> Option<PathBuf> {
        self.working_dir.as_ref().map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                base.join(dir)
            }
        })
    }
}

/// `[registry]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySection {
    /// How long terminal tasks stay pollable before pruning removes them.
    #[serde(default = "default_retention")]
    pub retention: HumanDuration,
}

fn default_retention() -> HumanDuration {
    HumanDuration::from_secs(60 * 60)
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            retention: default_retention(),
        }
    }
}

/// `[task.<class>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskClassConfig {
    /// Script path handed to `program`.
    pub script: String,

    /// Execution gate this class competes for. Defaults to the class name.
    #[serde(default)]
    pub gate: Option<String>,

    /// Overrides `[worker].default_timeout`.
    #[serde(default)]
    pub timeout: Option<HumanDuration>,

    /// Field holding the payload when the worker emits a JSON object.
    #[serde(default)]
    pub result_field: Option<String>,

    /// Static arguments appended right after the script.
    #[serde(default)]
    pub fixed_args: Vec<String>,

    /// Worker parallelism hint; `0` means "auto", absent means no flag.
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default)]
    pub flags: FlagNames,
}

impl TaskClassConfig {
    pub fn effective_gate<'a>(&'a self, class: &'a str) -> &'a str {
        self.gate.as_deref().unwrap_or(class)
    }

    pub fn effective_timeout(&self, default: HumanDuration) -> Duration {
        self.timeout.unwrap_or(default).as_duration()
    }

    /// Resolve `workers = 0` to `max(2, available parallelism)`.
    pub fn effective_workers(&self) -> Option<usize> {
        self.workers.map(|n| match n {
            0 => std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(1)
                .max(2),
            n => n,
        })
    }
}

/// `[task.<class>.flags]`: how each parameter is spelled on the command line.
///
/// An empty string drops that parameter from the command line entirely.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FlagNames {
    pub start: String,
    pub end: String,
    pub symbol: String,
    pub pattern: String,
    pub limit: String,
    pub workers: String,
}

impl Default for FlagNames {
    fn default() -> Self {
        Self {
            start: "--start".to_string(),
            end: "--end".to_string(),
            symbol: "--symbol".to_string(),
            pattern: "--pattern".to_string(),
            limit: "--topN".to_string(),
            workers: "--workers".to_string(),
        }
    }
}
