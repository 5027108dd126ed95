// src/logging.rs

//! Logging setup for `taskpoll` using `tracing` + `tracing-subscriber`.
//!
//! The filter is chosen in this order:
//! 1. `--log-level` CLI flag (if provided), applied to every target
//! 2. `TASKPOLL_LOG` environment variable, in `EnvFilter` directive syntax
//!    (e.g. `debug`, or `info,taskpoll::worker=warn` to quieten forwarded
//!    worker stderr)
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout only carries the final task
//! status document.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Target used for forwarded worker stderr lines.
pub const WORKER_TARGET: &str = "taskpoll::worker";

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "TASKPOLL_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let filter = build_filter(cli_level, env.as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(lvl) = cli_level {
        return EnvFilter::new(level_directive(lvl));
    }

    env.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn level_directive(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_directives_can_target_worker_output() {
        let filter = build_filter(None, Some("info,taskpoll::worker=warn"));
        let rendered = filter.to_string();
        assert!(rendered.contains("taskpoll::worker=warn"), "got {rendered}");
    }

    #[test]
    fn cli_level_wins_over_env() {
        let filter = build_filter(Some(LogLevel::Debug), Some("taskpoll::worker=off"));
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn unusable_env_falls_back_to_info() {
        assert_eq!(build_filter(None, Some("   ")).to_string(), "info");
        assert_eq!(build_filter(None, Some("taskpoll=loud")).to_string(), "info");
        assert_eq!(build_filter(None, None).to_string(), "info");
    }
}
