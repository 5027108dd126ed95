// src/cli.rs

//! CLI argument parsing using `clap`.

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;
use crate::protocol::TaskParams;
use crate::protocol::params::DEFAULT_TOP_N;

/// Command-line arguments for `taskpoll`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskpoll",
    version,
    about = "Run analysis workers as pollable, cancellable tasks.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Taskpoll.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKPOLL_LOG` filter directives or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Parse + validate the config and print the task classes.
    Check,

    /// Submit one task, poll it to completion and print its final status.
    Run(RunArgs),
}

#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Task class, i.e. a `[task.<class>]` name from the config.
    pub class: String,

    /// First day of the analysed range (YYYY-MM-DD).
    #[arg(long)]
    pub start: NaiveDate,

    /// Last day of the analysed range (YYYY-MM-DD).
    #[arg(long)]
    pub end: NaiveDate,

    /// Base symbol for similarity searches.
    #[arg(long)]
    pub symbol: Option<String>,

    /// Pattern name for pattern scans.
    #[arg(long)]
    pub pattern: Option<String>,

    /// Maximum number of results.
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    pub top_n: u32,

    /// Status polling interval in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 500)]
    pub poll_interval_ms: u64,
}

impl RunArgs {
    pub fn params(&self) -> TaskParams {
        TaskParams {
            start: self.start,
            end: self.end,
            symbol: self.symbol.clone(),
            pattern: self.pattern.clone(),
            top_n: self.top_n,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_arguments_become_task_params() {
        let args = CliArgs::try_parse_from([
            "taskpoll",
            "run",
            "similar",
            "--start",
            "2024-01-01",
            "--end",
            "2024-06-01",
            "--symbol",
            "005930",
            "--config",
            "conf/Taskpoll.toml",
        ])
        .unwrap();

        assert_eq!(args.config, "conf/Taskpoll.toml");
        let Command::Run(run) = args.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(run.class, "similar");
        let params = run.params();
        assert_eq!(params.symbol.as_deref(), Some("005930"));
        assert_eq!(params.top_n, DEFAULT_TOP_N);
        assert_eq!(params.start.to_string(), "2024-01-01");
    }

    #[test]
    fn config_defaults_to_the_loader_file_name() {
        let args = CliArgs::try_parse_from(["taskpoll", "check"]).unwrap();
        assert_eq!(args.config, DEFAULT_CONFIG_FILE);
        assert!(matches!(args.command, Command::Check));
        assert!(args.log_level.is_none());
    }

    #[test]
    fn malformed_dates_are_rejected() {
        let res = CliArgs::try_parse_from([
            "taskpoll", "run", "scan", "--start", "2024-13-01", "--end", "2024-06-01",
        ]);
        assert!(res.is_err());
    }
}
