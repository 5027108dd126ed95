pub mod builders;
pub mod stub_worker;

use std::sync::Once;
use std::time::Duration;

use taskpoll::TaskId;
use taskpoll::orchestrator::Orchestrator;
use taskpoll::registry::TaskStatus;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=taskpoll=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .try_init();
    });
}

/// Run a future with a 10-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Poll until `task_id` is terminal, failing the test after 10 seconds.
pub async fn wait_terminal(orchestrator: &Orchestrator, task_id: &TaskId) -> TaskStatus {
    with_timeout(orchestrator.wait_for_terminal(task_id, Duration::from_millis(10))).await
}

/// Read a pid a stub worker wrote to `path`, waiting for it to appear.
pub async fn read_pid_file(path: &std::path::Path) -> u32 {
    with_timeout(async {
        loop {
            if let Ok(text) = std::fs::read_to_string(path) {
                if let Ok(pid) = text.trim().parse() {
                    return pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

/// Poll until `pred` holds, failing the test after 10 seconds.
pub async fn wait_until(mut pred: impl FnMut() -> bool) {
    with_timeout(async {
        while !pred() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

/// Whether a process with `pid` is still running.
///
/// Zombies count as dead: a killed grandchild may sit unreaped under a
/// container's init for a while.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // The state letter follows the parenthesised command name.
        return stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X");
    }
    if std::path::Path::new("/proc/self").exists() {
        return false;
    }
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
