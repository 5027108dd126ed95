// src/exec/drain.rs

//! Concurrent stdout/stderr readers for a running worker.
//!
//! Both pipes are read by their own Tokio task from the moment the process is
//! spawned, so the worker can never block on a full pipe buffer regardless of
//! which stream it writes to first.

use std::collections::VecDeque;
use std::fmt;
use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::logging::WORKER_TARGET;
use crate::types::TaskId;

/// Last few stderr lines of a worker, kept for failure messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StderrTail(Vec<String>);

impl StderrTail {
    pub fn lines(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StderrTail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("\n"))
    }
}

/// Everything the drain collected once both streams hit end-of-file.
#[derive(Debug, Clone, Default)]
pub struct DrainOutput {
    pub stdout: String,
    pub stderr_tail: StderrTail,
}

/// Handles to the two reader tasks attached to one worker.
#[derive(Debug)]
pub struct StreamDrain {
    stdout: JoinHandle<io::Result<String>>,
    stderr: JoinHandle<io::Result<StderrTail>>,
}

impl StreamDrain {
    /// Take both pipes from `child` and start reading them.
    ///
    /// Fails if the child was not spawned with piped stdout and stderr.
    pub fn attach(child: &mut Child, task_id: TaskId, tail_lines: usize) -> io::Result<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("worker stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("worker stderr was not piped"))?;

        Ok(Self::spawn(stdout, stderr, task_id, tail_lines))
    }

    /// Start readers over arbitrary streams.
    pub fn spawn<O, E>(stdout: O, stderr: E, task_id: TaskId, tail_lines: usize) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let stdout = tokio::spawn(read_stdout(stdout, task_id));
        let stderr = tokio::spawn(forward_stderr(stderr, task_id, tail_lines));
        Self { stdout, stderr }
    }

    /// Wait for both readers to reach end-of-file.
    ///
    /// The caller bounds this wait; a drain that never finishes is a timeout.
    pub async fn collect(&mut self) -> io::Result<DrainOutput> {
        let (stdout, stderr) = tokio::join!(&mut self.stdout, &mut self.stderr);
        let stdout = stdout.map_err(io::Error::other)??;
        let stderr_tail = stderr.map_err(io::Error::other)??;
        Ok(DrainOutput {
            stdout,
            stderr_tail,
        })
    }

    /// Stop both readers. Used after the worker was killed, when a pipe may
    /// still be held open by a grandchild process.
    pub fn abort(&self) {
        self.stdout.abort();
        self.stderr.abort();
    }
}

async fn read_stdout<R>(mut rd: R, task_id: TaskId) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(8 * 1024);
    let n = rd.read_to_end(&mut buf).await?;
    debug!(task = %task_id, bytes = n, "worker stdout closed");
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn forward_stderr<R>(rd: R, task_id: TaskId, tail_lines: usize) -> io::Result<StderrTail>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(rd);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(tail_lines);
    let mut raw = Vec::with_capacity(1024);

    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw).await? == 0 {
            break;
        }
        trim_newline(&mut raw);
        let line = String::from_utf8_lossy(&raw).into_owned();

        info!(target: WORKER_TARGET, task = %task_id, "{}", line);

        if tail_lines > 0 {
            if tail.len() == tail_lines {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }

    Ok(StderrTail(tail.into()))
}

fn trim_newline(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn keeps_only_the_stderr_tail() {
        let (mut out_wr, out_rd) = tokio::io::duplex(1024);
        let (mut err_wr, err_rd) = tokio::io::duplex(1024);
        let mut drain = StreamDrain::spawn(out_rd, err_rd, TaskId::new(), 2);

        err_wr.write_all(b"loading\nscanning\r\nfailed: no data").await.unwrap();
        out_wr.write_all(b"[]").await.unwrap();
        drop(err_wr);
        drop(out_wr);

        let output = drain.collect().await.unwrap();
        assert_eq!(output.stdout, "[]");
        assert_eq!(output.stderr_tail.lines(), ["scanning", "failed: no data"]);
        assert_eq!(output.stderr_tail.to_string(), "scanning\nfailed: no data");
    }

    #[tokio::test]
    async fn streams_are_read_concurrently() {
        // A tiny pipe on stderr: if stdout were read to the end first, the
        // writer below would block forever on stderr.
        let (mut out_wr, out_rd) = tokio::io::duplex(64);
        let (mut err_wr, err_rd) = tokio::io::duplex(64);
        let mut drain = StreamDrain::spawn(out_rd, err_rd, TaskId::new(), 1);

        let writer = tokio::spawn(async move {
            for i in 0..500 {
                err_wr
                    .write_all(format!("progress {i}\n").as_bytes())
                    .await
                    .unwrap();
            }
            drop(err_wr);
            out_wr.write_all(b"{\"ok\":true}").await.unwrap();
        });

        let output = tokio::time::timeout(std::time::Duration::from_secs(5), drain.collect())
            .await
            .expect("drain deadlocked")
            .unwrap();
        writer.await.unwrap();

        assert_eq!(output.stdout, "{\"ok\":true}");
        assert_eq!(output.stderr_tail.lines(), ["progress 499"]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_not_fatal() {
        let (mut out_wr, out_rd) = tokio::io::duplex(64);
        let (err_wr, err_rd) = tokio::io::duplex(64);
        let mut drain = StreamDrain::spawn(out_rd, err_rd, TaskId::new(), 4);

        out_wr.write_all(&[b'[', 0xff, b']']).await.unwrap();
        drop(out_wr);
        drop(err_wr);

        let output = drain.collect().await.unwrap();
        assert_eq!(output.stdout, "[\u{fffd}]");
        assert!(output.stderr_tail.is_empty());
    }
}
