#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use taskpoll::config::{
    ConfigFile, FlagNames, HumanDuration, RawConfigFile, RegistrySection, TaskClassConfig,
    WorkerSection,
};
use taskpoll::orchestrator::Orchestrator;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from a worker section that launches `sh -c`, so task classes
/// built with [`TaskClassBuilder::stub`] run shell one-liners.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                worker: WorkerSection {
                    program: "sh".to_string(),
                    program_args: vec!["-c".to_string()],
                    ..WorkerSection::default()
                },
                registry: RegistrySection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_class(mut self, name: &str, class: TaskClassConfig) -> Self {
        self.config.task.insert(name.to_string(), class);
        self
    }

    pub fn program(mut self, program: &str) -> Self {
        self.config.worker.program = program.to_string();
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.worker.default_timeout = HumanDuration::from(timeout);
        self
    }

    pub fn retention(mut self, retention: Duration) -> Self {
        self.config.registry.retention = HumanDuration::from(retention);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config.worker.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    /// Build the config and an orchestrator rooted at the current directory.
    pub fn orchestrator(self) -> Orchestrator {
        Orchestrator::from_config(&self.build(), Path::new("."))
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskClassConfig`.
pub struct TaskClassBuilder {
    class: TaskClassConfig,
}

impl TaskClassBuilder {
    pub fn new(script: &str) -> Self {
        Self {
            class: TaskClassConfig {
                script: script.to_string(),
                gate: None,
                timeout: None,
                result_field: None,
                fixed_args: vec![],
                workers: None,
                flags: FlagNames::default(),
            },
        }
    }

    /// A class whose "script" is a shell snippet run by `sh -c`.
    ///
    /// The snippet sees the rendered task arguments as `$1..$n`.
    pub fn stub(snippet: &str) -> Self {
        Self::new(snippet).fixed_arg("stub-worker")
    }

    pub fn gate(mut self, gate: &str) -> Self {
        self.class.gate = Some(gate.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.class.timeout = Some(HumanDuration::from(timeout));
        self
    }

    pub fn result_field(mut self, field: &str) -> Self {
        self.class.result_field = Some(field.to_string());
        self
    }

    pub fn fixed_arg(mut self, arg: &str) -> Self {
        self.class.fixed_args.push(arg.to_string());
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.class.workers = Some(workers);
        self
    }

    pub fn flags(mut self, flags: FlagNames) -> Self {
        self.class.flags = flags;
        self
    }

    pub fn build(self) -> TaskClassConfig {
        self.class
    }
}
