// src/orchestrator/class_spec.rs

use std::path::Path;
use std::time::Duration;

use crate::config::{ConfigFile, TaskClassConfig};
use crate::protocol::InvocationTemplate;

/// Everything the orchestrator needs to run one task class, resolved from
/// config once at startup.
#[derive(Debug, Clone)]
pub struct TaskClassSpec {
    pub class: String,
    pub gate: String,
    pub timeout: Duration,
    pub result_field: Option<String>,
    pub template: InvocationTemplate,
}

impl TaskClassSpec {
    pub fn from_config(
        cfg: &ConfigFile,
        class: &str,
        task: &TaskClassConfig,
        base_dir: &Path,
    ) -> Self {
        Self {
            class: class.to_string(),
            gate: task.effective_gate(class).to_string(),
            timeout: task.effective_timeout(cfg.worker.default_timeout),
            result_field: task.result_field.clone(),
            template: InvocationTemplate::from_config(&cfg.worker, task, base_dir),
        }
    }

    /// Resolve every `[task.<class>]` in `cfg`.
    pub fn all_from_config(cfg: &ConfigFile, base_dir: &Path) -> Vec<Self> {
        cfg.task
            .iter()
            .map(|(class, task)| Self::from_config(cfg, class, task, base_dir))
            .collect()
    }
}
