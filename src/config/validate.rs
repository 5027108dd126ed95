// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TaskpollError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TaskpollError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.worker, raw.registry, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_worker_section(cfg)?;
    validate_task_classes(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(TaskpollError::ConfigError(
            "config must contain at least one [task.<class>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_worker_section(cfg: &RawConfigFile) -> Result<()> {
    let worker = &cfg.worker;

    if worker.program.trim().is_empty() {
        return Err(TaskpollError::ConfigError(
            "[worker].program must not be empty".to_string(),
        ));
    }

    if worker.stderr_tail_lines == 0 {
        return Err(TaskpollError::ConfigError(
            "[worker].stderr_tail_lines must be >= 1 (got 0)".to_string(),
        ));
    }

    if worker.default_timeout.as_duration() == Duration::ZERO {
        return Err(TaskpollError::ConfigError(
            "[worker].default_timeout must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_task_classes(cfg: &RawConfigFile) -> Result<()> {
    for (class, task) in cfg.task.iter() {
        if task.script.trim().is_empty() {
            return Err(TaskpollError::ConfigError(format!(
                "task class '{class}' has an empty `script`"
            )));
        }

        if task.effective_gate(class).trim().is_empty() {
            return Err(TaskpollError::ConfigError(format!(
                "task class '{class}' has an empty `gate`"
            )));
        }

        if let Some(timeout) = task.timeout {
            if timeout.as_duration() == Duration::ZERO {
                return Err(TaskpollError::ConfigError(format!(
                    "task class '{class}' has a zero `timeout`"
                )));
            }
        }

        if matches!(task.result_field.as_deref(), Some(f) if f.trim().is_empty()) {
            return Err(TaskpollError::ConfigError(format!(
                "task class '{class}' has an empty `result_field`"
            )));
        }
    }
    Ok(())
}
