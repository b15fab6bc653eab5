//! Child process transport
//!
//! Owns the server process and its three pipes. Everything above this
//! module sees only "write a line", "read a line" and "stop".

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::common::{Error, Result};

use super::codec;

/// Number of server stderr lines kept for diagnostics
const STDERR_TAIL_LINES: usize = 64;

/// Everything needed to launch the server under test
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Executable to run (the runtime, or the server itself)
    pub program: OsString,
    /// Arguments, usually the artifact path first
    pub args: Vec<OsString>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Delay after spawning before the transport is handed out
    pub startup_grace: Duration,
    /// How long `stop()` waits after asking the process to terminate
    pub shutdown_timeout: Duration,
}

impl LaunchSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            startup_grace: Duration::ZERO,
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Human-readable command line for logs
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Line transport over a child process's stdio
pub struct Transport {
    /// Server subprocess, `None` once stopped
    child: Option<Child>,
    /// Buffered writer for server stdin
    writer: Option<BufWriter<ChildStdin>>,
    /// Buffered reader for server stdout
    reader: Option<BufReader<ChildStdout>>,
    /// Bytes of a line not yet terminated
    pending: Vec<u8>,
    /// Task draining server stderr
    stderr_task: Option<JoinHandle<()>>,
    /// Most recent stderr lines
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    /// Exit status once the process has been reaped
    exit_status: Option<ExitStatus>,
    shutdown_timeout: Duration,
}

impl Transport {
    /// Spawn the server and wait out the startup grace delay
    pub async fn start(spec: &LaunchSpec) -> Result<Self> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::LaunchFailed(format!("{}: {}", spec.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::LaunchFailed("Failed to get server stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::LaunchFailed("Failed to get server stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::LaunchFailed("Failed to get server stderr".to_string()))?;

        tracing::info!(pid = ?child.id(), command = %spec.display(), "Server started");

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr_task = tokio::spawn(drain_stderr(stderr, Arc::clone(&stderr_tail)));

        if !spec.startup_grace.is_zero() {
            tokio::time::sleep(spec.startup_grace).await;
        }

        Ok(Self {
            child: Some(child),
            writer: Some(BufWriter::new(stdin)),
            reader: Some(BufReader::new(stdout)),
            pending: Vec::new(),
            stderr_task: Some(stderr_task),
            stderr_tail,
            exit_status: None,
            shutdown_timeout: spec.shutdown_timeout,
        })
    }

    /// Write one line and flush it
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            Error::TransportWrite(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport is stopped",
            ))
        })?;

        codec::write_line(writer, line)
            .await
            .map_err(Error::TransportWrite)
    }

    /// Read one raw line, or `None` once the server closed stdout
    pub async fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        Ok(codec::read_line(reader, &mut self.pending).await?)
    }

    /// Process id while the server is running
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Exit status, once known
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Snapshot of the most recent server stderr lines
    pub fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Wait up to `limit` for the server to exit on its own
    ///
    /// Returns `None` if it is still running when the deadline passes.
    /// On exit, stderr is drained completely before returning.
    pub async fn wait_for_exit(&mut self, limit: Duration) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };

        match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => {
                let status = status?;
                self.exit_status = Some(status);
                self.child = None;
                self.join_stderr().await;
                Ok(Some(status))
            }
            Err(_) => Ok(None),
        }
    }

    /// Stop the server
    ///
    /// Closes stdin, asks the process to terminate, and kills it if it is
    /// still alive after the shutdown timeout. Calling this again is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        // Dropping the writer closes the child's stdin
        if let Some(mut writer) = self.writer.take() {
            let _ = tokio::io::AsyncWriteExt::shutdown(&mut writer).await;
        }
        self.reader = None;

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = match child.try_wait()? {
            Some(status) => status,
            None => {
                request_termination(&mut child);
                match tokio::time::timeout(self.shutdown_timeout, child.wait()).await {
                    Ok(status) => status?,
                    Err(_) => {
                        tracing::warn!(
                            "Server did not exit within {:?}, killing it",
                            self.shutdown_timeout
                        );
                        child.kill().await?;
                        child.wait().await?
                    }
                }
            }
        };

        tracing::info!(%status, "Server stopped");
        self.exit_status = Some(status);
        self.join_stderr().await;

        Ok(())
    }

    async fn join_stderr(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            // A grandchild holding the pipe open must not stall us
            if tokio::time::timeout(Duration::from_secs(1), task).await.is_err() {
                tracing::debug!("stderr drain still running after exit");
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            tracing::debug!(pid = ?child.id(), "Transport dropped while server running, killing");
            let _ = child.start_kill();
            let _ = child.try_wait();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Ask the process to exit gracefully
#[cfg(unix)]
fn request_termination(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: pid belongs to a child we have not yet reaped
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    let _ = child.start_kill();
}

/// Forward server stderr to the log and keep a bounded tail
async fn drain_stderr(stderr: ChildStderr, tail: Arc<Mutex<VecDeque<String>>>) {
    let mut lines = BufReader::new(stderr).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::warn!(target: "mcp_smoke::server", "{}", line);
                if let Ok(mut tail) = tail.lock() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("stderr read failed: {}", e);
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> LaunchSpec {
        LaunchSpec::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let err = Transport::start(&LaunchSpec::new("/nonexistent/mcp-smoke-server"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::LaunchFailed(_)));
    }

    #[tokio::test]
    async fn test_echo_line() {
        let mut transport = Transport::start(&sh("read line; echo \"$line\"")).await.unwrap();

        transport.write_line("{\"ping\":1}").await.unwrap();
        assert_eq!(
            transport.read_line().await.unwrap().as_deref(),
            Some(b"{\"ping\":1}".as_slice())
        );
        assert_eq!(transport.read_line().await.unwrap(), None);

        transport.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut transport = Transport::start(&sh("cat")).await.unwrap();
        assert!(transport.pid().is_some());

        transport.stop().await.unwrap();
        let first = transport.exit_status();
        assert!(first.is_some());

        transport.stop().await.unwrap();
        assert_eq!(transport.exit_status(), first);
        assert!(transport.pid().is_none());
    }

    #[tokio::test]
    async fn test_write_after_stop_fails() {
        let mut transport = Transport::start(&sh("cat")).await.unwrap();
        transport.stop().await.unwrap();

        let err = transport.write_line("{}").await.unwrap_err();
        assert!(
            matches!(err, Error::TransportWrite(ref e) if e.kind() == io::ErrorKind::NotConnected)
        );
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stop_kills_process_ignoring_sigterm() {
        let spec = sh("trap '' TERM; while true; do sleep 1; done")
            .shutdown_timeout(Duration::from_millis(200));
        let mut transport = Transport::start(&spec).await.unwrap();

        transport.stop().await.unwrap();
        assert!(transport.exit_status().is_some());
    }

    #[tokio::test]
    async fn test_stderr_tail_after_exit() {
        let mut transport = Transport::start(&sh("echo 'missing key' >&2; exit 1"))
            .await
            .unwrap();

        let status = transport
            .wait_for_exit(Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.code(), Some(1));
        assert_eq!(transport.stderr_tail(), vec!["missing key".to_string()]);

        transport.stop().await.unwrap();
    }
}
