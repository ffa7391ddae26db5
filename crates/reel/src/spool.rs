//! One spawned OS process and its three standard streams.

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::Chunk;
use crate::command::Cmd;
use crate::config::ReelConfig;
use crate::error::{ReelError, Result, StreamEnd, is_closed_pipe};
use crate::scope::Scope;
use crate::track::Streamer;
use crate::transport::Transport;

/// Handle to a single pipeline stage backed by one process.
///
/// Clones share the same process. Configure with the builder methods
/// ([`limit`](Self::limit), [`timeout`](Self::timeout), ...) before starting;
/// after that the handle is only passed around.
#[derive(Clone)]
pub struct Spool {
    cmd: Cmd,
    limit: Option<u64>,
    timeout: Option<Duration>,
    config: ReelConfig,
    state: Arc<SpoolState>,
}

#[derive(Default)]
struct SpoolState {
    started: AtomicBool,
    pid: OnceLock<u32>,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<Option<ChildStdout>>,
    stderr: Arc<StdMutex<Vec<u8>>>,
    stderr_task: StdMutex<Option<JoinHandle<()>>>,
    meter: StdMutex<Meter>,
    /// Fired when close begins; pending reads and writes give up.
    closing: CancellationToken,
    closed: OnceCell<()>,
    status: OnceLock<ExitStatus>,
    releases: AtomicUsize,
}

#[derive(Default)]
struct Meter {
    received: u64,
    chunks: u64,
    since: Option<Instant>,
    end: Option<StreamEnd>,
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Spool {
    pub fn new(cmd: Cmd) -> Self {
        Self {
            cmd,
            limit: None,
            timeout: None,
            config: ReelConfig::default(),
            state: Arc::default(),
        }
    }

    /// Parse a whole command line into a spool.
    pub fn parse(line: &str) -> Result<Self> {
        Ok(Self::new(Cmd::parse(line)?))
    }

    /// Stop streaming once at least `bytes` have been forwarded.
    ///
    /// Checked after each chunk, so up to one chunk more may pass.
    pub fn limit(mut self, bytes: u64) -> Self {
        self.limit = Some(bytes);
        self
    }

    /// Stop streaming once `duration` has elapsed since the first read.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    pub fn with_config(mut self, config: ReelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cmd(&self) -> &Cmd {
        &self.cmd
    }

    /// Run alone with optional stdin text and return its stdout.
    pub async fn run(&self, message: Option<&str>) -> Result<String> {
        Transport::new([self.clone()]).read(message).await
    }

    pub fn pid(&self) -> Option<u32> {
        self.state.pid.get().copied()
    }

    pub fn is_started(&self) -> bool {
        self.state.started.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.initialized()
    }

    /// Whether the process has been spawned and has not exited yet.
    pub async fn is_running(&self) -> bool {
        let mut child = self.state.child.lock().await;
        matches!(child.as_mut().map(|c| c.try_wait()), Some(Ok(None)))
    }

    /// Exit status recorded by [`close`](Streamer::close).
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.state.status.get().copied()
    }

    /// Exit code; `None` before close or when killed by a signal.
    pub fn returncode(&self) -> Option<i32> {
        self.exit_status().and_then(|s| s.code())
    }

    /// Everything the process wrote to stderr so far, if anything.
    pub fn stderr(&self) -> Option<String> {
        let buf = lock(&self.state.stderr);
        if buf.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&buf).into_owned())
        }
    }

    /// Bytes handed out by [`pull_chunk`](Streamer::pull_chunk).
    pub fn bytes_out(&self) -> u64 {
        lock(&self.state.meter).received
    }

    /// How many times this spool's resources were released (0 or 1).
    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    pub fn same_as(&self, other: &Spool) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Ask the process to exit (SIGTERM), then release it.
    ///
    /// A process still running after the close grace period is killed.
    pub async fn terminate(&self) -> Result<()> {
        if let Some(child) = self.state.child.lock().await.as_mut() {
            request_exit(child, &self.cmd);
        }
        self.close().await
    }

    fn quota_reached(&self) -> Option<StreamEnd> {
        let meter = lock(&self.state.meter);
        if meter.chunks == 0 {
            return None;
        }
        if let Some(limit) = self.limit {
            if meter.received >= limit {
                return Some(StreamEnd::Limit);
            }
        }
        match (self.timeout, meter.since) {
            (Some(timeout), Some(since)) if since.elapsed() >= timeout => Some(StreamEnd::Timeout),
            _ => None,
        }
    }

    /// Bytes to ask for next: never past the byte limit, never zero.
    fn read_size(&self, max_bytes: usize) -> usize {
        let remaining = self.limit.map(|limit| {
            let received = lock(&self.state.meter).received;
            usize::try_from(limit.saturating_sub(received)).unwrap_or(usize::MAX)
        });
        remaining.map_or(max_bytes, |r| r.min(max_bytes)).max(1)
    }

    fn mark_end(&self, end: StreamEnd) {
        let mut meter = lock(&self.state.meter);
        if meter.end.is_none() {
            meter.end = Some(end);
        }
    }

    async fn release(&self) {
        self.state.closing.cancel();
        drop(self.state.stdin.lock().await.take());
        drop(self.state.stdout.lock().await.take());

        let child = self.state.child.lock().await.take();
        if let Some(mut child) = child {
            let grace = self.config.close_grace;
            let status = match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => Some(status),
                Ok(Err(e)) => {
                    tracing::warn!(command = %self.cmd, error = %e, "wait failed");
                    None
                }
                Err(_) => {
                    tracing::warn!(
                        command = %self.cmd,
                        grace_ms = grace.as_millis() as u64,
                        "process did not exit; killing"
                    );
                    if let Err(e) = child.kill().await {
                        tracing::warn!(command = %self.cmd, error = %e, "kill failed");
                    }
                    child.wait().await.ok()
                }
            };
            if let Some(status) = status {
                let _ = self.state.status.set(status);
            }
            tracing::debug!(command = %self.cmd, pid = ?self.pid(), ?status, "closed");
        }

        let drain = lock(&self.state.stderr_task).take();
        if let Some(mut drain) = drain {
            if tokio::time::timeout(self.config.close_grace, &mut drain)
                .await
                .is_err()
            {
                drain.abort();
            }
        }
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child, command: &Cmd) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    // `id()` is gone once the child was reaped, so a recycled pid is never hit.
    let Some(pid) = child.id() else { return };
    let Ok(pid) = i32::try_from(pid) else { return };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        tracing::debug!(command = %command, pid, error = %e, "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child, command: &Cmd) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(command = %command, error = %e, "kill failed");
    }
}

async fn drain_stderr(mut stderr: ChildStderr, buffer: Arc<StdMutex<Vec<u8>>>, command: String, chunk: usize) {
    let mut buf = vec![0u8; chunk];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => lock(&buffer).extend_from_slice(&buf[..n]),
            Err(e) => {
                tracing::debug!(command = %command, error = %e, "stderr closed while draining");
                break;
            }
        }
    }
}

#[async_trait]
impl Streamer for Spool {
    async fn start(&self, scope: &Scope, input: Option<Chunk>) -> Result<()> {
        if self.state.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut command = self.cmd.to_command();
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.state.started.store(false, Ordering::SeqCst);
                return Err(ReelError::Spawn {
                    command: self.cmd.to_string(),
                    source,
                });
            }
        };

        if let Some(pid) = child.id() {
            let _ = self.state.pid.set(pid);
        }
        *self.state.stdin.lock().await = child.stdin.take();
        *self.state.stdout.lock().await = child.stdout.take();
        if let Some(stderr) = child.stderr.take() {
            let drain = tokio::spawn(drain_stderr(
                stderr,
                self.state.stderr.clone(),
                self.cmd.to_string(),
                self.config.chunk_bytes(),
            ));
            *lock(&self.state.stderr_task) = Some(drain);
        }
        *self.state.child.lock().await = Some(child);
        tracing::debug!(command = %self.cmd, pid = ?self.pid(), "spawned");

        if let Some(message) = input {
            let this = self.clone();
            scope.spawn(async move {
                this.send_chunk(&message).await?;
                this.close_input().await
            });
        }
        Ok(())
    }

    async fn pull_chunk(&self, max_bytes: usize) -> Result<Option<Chunk>> {
        if let Some(end) = self.quota_reached() {
            tracing::debug!(command = %self.cmd, bytes = self.bytes_out(), ?end, "quota reached");
            self.mark_end(end);
            // Nobody reads past the quota; the process must not block on a full pipe.
            drop(self.state.stdout.lock().await.take());
            return Ok(None);
        }
        lock(&self.state.meter).since.get_or_insert_with(Instant::now);

        let mut stdout = self.state.stdout.lock().await;
        let Some(reader) = stdout.as_mut() else {
            self.mark_end(StreamEnd::Closed);
            return Ok(None);
        };
        let mut buf = vec![0u8; self.read_size(max_bytes)];
        let read = tokio::select! {
            biased;
            _ = self.state.closing.cancelled() => {
                self.mark_end(StreamEnd::Closed);
                return Ok(None);
            }
            r = reader.read(&mut buf) => r,
        };
        match read {
            Ok(0) => {
                *stdout = None;
                self.mark_end(StreamEnd::Eof);
                Ok(None)
            }
            Ok(n) => {
                buf.truncate(n);
                let mut meter = lock(&self.state.meter);
                meter.received += n as u64;
                meter.chunks += 1;
                Ok(Some(buf))
            }
            Err(e) if is_closed_pipe(&e) => {
                tracing::debug!(command = %self.cmd, error = %e, "stdout closed");
                self.mark_end(StreamEnd::Closed);
                Ok(None)
            }
            Err(source) => Err(ReelError::Io {
                command: self.cmd.to_string(),
                source,
            }),
        }
    }

    async fn send_chunk(&self, chunk: &[u8]) -> Result<bool> {
        let mut stdin = self.state.stdin.lock().await;
        let Some(writer) = stdin.as_mut() else {
            return Ok(false);
        };
        let written = tokio::select! {
            biased;
            _ = self.state.closing.cancelled() => return Ok(false),
            r = writer.write_all(chunk) => r,
        };
        match written {
            Ok(()) => Ok(true),
            Err(e) if is_closed_pipe(&e) => {
                tracing::debug!(command = %self.cmd, error = %e, "stdin closed by process");
                *stdin = None;
                Ok(false)
            }
            Err(source) => Err(ReelError::Io {
                command: self.cmd.to_string(),
                source,
            }),
        }
    }

    async fn close_input(&self) -> Result<()> {
        drop(self.state.stdin.lock().await.take());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.is_started() {
            return Ok(());
        }
        self.state.closed.get_or_init(|| self.release()).await;
        Ok(())
    }

    fn chunk_bytes(&self) -> usize {
        self.config.chunk_bytes()
    }

    fn end_reason(&self) -> StreamEnd {
        lock(&self.state.meter).end.unwrap_or(StreamEnd::Eof)
    }
}

impl fmt::Display for Spool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.cmd.fmt(f)
    }
}

impl fmt::Debug for Spool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spool")
            .field("cmd", &self.cmd.to_string())
            .field("limit", &self.limit)
            .field("timeout", &self.timeout)
            .field("pid", &self.pid())
            .finish()
    }
}
