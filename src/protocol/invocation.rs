// src/protocol/invocation.rs

//! Turning task parameters into a concrete worker command line.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::config::{FlagNames, TaskClassConfig, WorkerSection};

use super::params::{InvocationError, TaskParams};

/// Everything about a class's command line that does not depend on the
/// request: program, script, static arguments, flag spellings, cwd, env.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationTemplate {
    pub program: String,
    pub program_args: Vec<String>,
    pub script: String,
    pub fixed_args: Vec<String>,
    pub flags: FlagNames,
    pub workers: Option<usize>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

/// A fully rendered command line for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl InvocationTemplate {
    pub fn from_config(worker: &WorkerSection, class: &TaskClassConfig, base_dir: &Path) -> Self {
        Self {
            program: worker.program.clone(),
            program_args: worker.program_args.clone(),
            script: class.script.clone(),
            fixed_args: class.fixed_args.clone(),
            flags: class.flags.clone(),
            workers: class.effective_workers(),
            working_dir: worker.resolved_working_dir(base_dir),
            env: worker.effective_env(),
        }
    }

    /// Render the argument vector:
    /// `program_args.. script fixed_args.. start end [symbol] [pattern] limit [workers]`.
    pub fn render(&self, params: &TaskParams) -> Result<Invocation, InvocationError> {
        params.validate()?;

        let mut args = self.program_args.clone();
        args.push(self.script.clone());
        args.extend(self.fixed_args.iter().cloned());

        let flags = &self.flags;
        push_flag(&mut args, &flags.start, params.start.format("%Y-%m-%d").to_string());
        push_flag(&mut args, &flags.end, params.end.format("%Y-%m-%d").to_string());
        if let Some(symbol) = &params.symbol {
            push_flag(&mut args, &flags.symbol, symbol.trim().to_string());
        }
        if let Some(pattern) = &params.pattern {
            push_flag(&mut args, &flags.pattern, pattern.trim().to_string());
        }
        push_flag(&mut args, &flags.limit, params.top_n.to_string());
        if let Some(workers) = self.workers {
            push_flag(&mut args, &flags.workers, workers.to_string());
        }

        Ok(Invocation {
            program: self.program.clone(),
            args,
            working_dir: self.working_dir.clone(),
            env: self.env.clone(),
        })
    }
}

fn push_flag(args: &mut Vec<String>, flag: &str, value: String) {
    if flag.is_empty() {
        return;
    }
    args.push(flag.to_string());
    args.push(value);
}

impl Invocation {
    /// Build the `tokio` command with both output streams piped and stdin
    /// closed. The child is killed if its handle is dropped.
    ///
    /// On unix the worker leads its own process group, so everything it
    /// forks can be killed together.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Shell-ish rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_from_str;

    fn params() -> TaskParams {
        TaskParams::new("2024-01-01".parse().unwrap(), "2024-06-01".parse().unwrap())
    }

    fn template(toml: &str, class: &str) -> InvocationTemplate {
        let raw = load_from_str(toml).unwrap();
        InvocationTemplate::from_config(&raw.worker, &raw.task[class], Path::new("/srv/app"))
    }

    #[test]
    fn renders_default_flags_in_order() {
        let tpl = template(
            r#"
[worker]
working_dir = "python"

[task.chart_pattern]
script = "stock/py/find_chart_patterns.py"
workers = 3
"#,
            "chart_pattern",
        );

        let inv = tpl.render(&params().with_pattern("double_bottom")).unwrap();
        assert_eq!(inv.program, "python3");
        assert_eq!(
            inv.args,
            vec![
                "-u",
                "stock/py/find_chart_patterns.py",
                "--start",
                "2024-01-01",
                "--end",
                "2024-06-01",
                "--pattern",
                "double_bottom",
                "--topN",
                "10",
                "--workers",
                "3",
            ]
        );
        assert_eq!(inv.working_dir, Some(PathBuf::from("/srv/app/python")));
        assert_eq!(inv.env.get("PYTHONIOENCODING").map(String::as_str), Some("utf-8"));
    }

    #[test]
    fn renamed_flags_and_fixed_args_are_honoured() {
        let tpl = template(
            r#"
[task.last_close_downward]
script = "find_last_close_downward.py"
fixed_args = ["--base_symbol", "ALL"]
flags = { start = "--start_date", end = "--end_date" }
"#,
            "last_close_downward",
        );

        let inv = tpl.render(&params().with_top_n(5)).unwrap();
        assert_eq!(
            inv.args,
            vec![
                "-u",
                "find_last_close_downward.py",
                "--base_symbol",
                "ALL",
                "--start_date",
                "2024-01-01",
                "--end_date",
                "2024-06-01",
                "--topN",
                "5",
            ]
        );
        assert_eq!(inv.working_dir, None);
    }

    #[test]
    fn empty_flag_name_omits_the_parameter() {
        let tpl = template(
            r#"
[task.chart_image]
script = "find_similar_full.py"
flags = { symbol = "--base_symbol", limit = "" }
"#,
            "chart_image",
        );

        let inv = tpl.render(&params().with_symbol("005930")).unwrap();
        assert!(!inv.args.iter().any(|a| a == "--topN" || a == "10"));
        assert!(inv.args.windows(2).any(|w| w == ["--base_symbol", "005930"]));
    }

    #[test]
    fn auto_workers_is_at_least_two() {
        let tpl = template(
            r#"
[task.scan]
script = "scan.py"
workers = 0
"#,
            "scan",
        );
        assert!(tpl.workers.unwrap() >= 2);
    }

    #[test]
    fn invalid_params_are_not_rendered() {
        let tpl = template("[task.scan]\nscript = \"scan.py\"\n", "scan");
        assert!(tpl.render(&params().with_top_n(0)).is_err());
    }

    #[test]
    fn env_overrides_win_over_utf8_default() {
        let tpl = template(
            r#"
[worker.env]
PYTHONIOENCODING = "utf-8:replace"
DATA_DIR = "/data"

[task.scan]
script = "scan.py"
"#,
            "scan",
        );
        assert_eq!(tpl.env["PYTHONIOENCODING"], "utf-8:replace");
        assert_eq!(tpl.env["DATA_DIR"], "/data");
    }
}
