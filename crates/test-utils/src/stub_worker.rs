//! Shell one-liners standing in for real analysis workers.
//!
//! Every stub runs as `sh -c '<script>' <script-name> <args..>`, so the
//! rendered task arguments land in `$1..$n` and the stub can ignore them.
//! Some stubs fork a child of their own and record its pid in a file, so
//! tests can check that nothing the worker started outlives it.

use std::path::Path;

/// Print a two-record JSON array.
pub const TWO_RECORDS: &str =
    r#"echo '[{"symbol":"005930","score":0.93},{"symbol":"000660","score":0.88}]'"#;

/// Echo the rendered arguments back as a JSON array of strings.
pub const ECHO_ARGS: &str = r#"printf '['; sep=''; for a in "$@"; do printf '%s"%s"' "$sep" "$a"; sep=','; done; printf ']\n'"#;

/// Print an object wrapping the records under `similar_stocks`.
pub const WRAPPED_RECORDS: &str =
    r#"echo '{"base_symbol":"005930","similar_stocks":[{"symbol":"000660","similarity":0.9}]}'"#;

/// Report an error through the JSON protocol while exiting 0.
pub const REPORTS_ERROR: &str = r#"echo '{"error":"no data for range"}'"#;

/// Exit 1 after writing a diagnostic to stderr.
pub const CRASHES: &str = "echo 'Traceback: boom' >&2; exit 1";

/// Exit 0 without writing anything.
pub const SILENT: &str = "exit 0";

/// Exit 0 with output that is not JSON.
pub const GARBAGE: &str = "echo 'not json at all'";

/// Sleep far longer than any test budget.
pub const SLEEPS: &str = "exec sleep 30";

/// Write about 200 KiB to stderr before printing the result.
pub const NOISY_STDERR: &str = r#"i=0; while [ $i -lt 4000 ]; do echo "progress line $i padding padding padding"; i=$((i+1)); done >&2; echo '[{"symbol":"TEST"}]'"#;

/// Write about 200 KiB of JSON to stdout.
pub const LARGE_STDOUT: &str = r#"printf '['; i=0; while [ $i -lt 4000 ]; do printf '{"symbol":"S%05d","score":0.5},' $i; i=$((i+1)); done; printf '{"symbol":"LAST","score":0.1}]\n'"#;

/// Sleep briefly, then print a record. Used to keep a gate busy.
pub fn slow_records(seconds: f32) -> String {
    format!(r#"sleep {seconds}; echo '[{{"symbol":"SLOW"}}]'"#)
}

/// Fork a long sleep that shares the worker's pipes, record its pid in
/// `pid_file`, and wait for it.
pub fn forks_child(pid_file: &Path) -> String {
    format!("sleep 30 & echo $! > '{}'; wait", pid_file.display())
}

/// Fork a detached long sleep, record its pid in `pid_file`, and exit 0
/// with a valid document while the sleep is still running.
pub fn leaves_child_behind(pid_file: &Path) -> String {
    format!(
        r#"sleep 30 >/dev/null 2>&1 & echo $! > '{}'; echo '[{{"symbol":"TEST"}}]'"#,
        pid_file.display()
    )
}
