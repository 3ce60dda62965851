//! One supervised classifier worker process.
//!
//! A `Worker` owns a long-lived external process and speaks a line-framed
//! JSON protocol over its standard streams: one JSON object per line in,
//! one JSON object per line out, matched in strict send order (FIFO, no
//! request ids). A dedicated reader task demultiplexes the output stream
//! into the worker's pending-call queue; stderr is captured into a
//! bounded ring buffer for diagnostics but never parsed.
//!
//! The dispatch path and the reader task are the only two mutators of a
//! worker's queue, and both go through the same per-worker mutex.

use serde_json::Value;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::WorkerSpec;
use crate::{tlog_debug, tlog_trace, tlog_warn, Error, Result};

/// Lines of stderr kept per worker for diagnostics.
const STDERR_TAIL_LINES: usize = 200;

/// Unique identifier for a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 characters of the UUID for log lines.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle events reported to the pool supervisor.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// The worker process exited (EOF on stdout or abnormal termination).
    Exited {
        id: WorkerId,
        code: Option<i32>,
    },
}

/// One in-flight request awaiting a response line from this worker.
struct PendingCall {
    /// Sequence number, used to remove this exact call on timeout.
    seq: u64,
    tx: oneshot::Sender<Result<Value>>,
}

struct WorkerInner {
    stdin: Option<tokio::process::ChildStdin>,
    /// FIFO: the head is matched to the next complete response line.
    pending: VecDeque<PendingCall>,
    alive: bool,
    next_seq: u64,
}

/// A supervised external worker process.
pub struct Worker {
    id: WorkerId,
    inner: Arc<Mutex<WorkerInner>>,
    stderr_tail: Arc<StdMutex<VecDeque<String>>>,
}

impl Worker {
    /// Spawn the worker process and its reader tasks.
    ///
    /// `program` is the already-resolved executable path (resolution
    /// happens in configuration loading, not here). Exit events are
    /// reported on `events`; `cancel` stops the reader and kills the
    /// process on pool shutdown.
    pub fn spawn(
        program: &std::path::Path,
        spec: &WorkerSpec,
        events: mpsc::Sender<WorkerEvent>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let mut command = Command::new(program);
        command
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::WorkerUnavailable("no stdin handle".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::WorkerUnavailable("no stdout handle".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::WorkerUnavailable("no stderr handle".to_string()))?;

        let id = WorkerId::new();
        let inner = Arc::new(Mutex::new(WorkerInner {
            stdin: Some(stdin),
            pending: VecDeque::new(),
            alive: true,
            next_seq: 0,
        }));
        let stderr_tail = Arc::new(StdMutex::new(VecDeque::new()));

        // Stderr capture task: buffered, never parsed.
        {
            let tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tlog_trace!("worker {} stderr: {}", id.short(), line);
                    let mut tail = match tail.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    if tail.len() >= STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            });
        }

        // Reader task: splits stdout on line boundaries and resolves the
        // queue head per complete line. Owns the child so it can reap it.
        {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let _ = child.kill().await;
                            break;
                        }
                        line = lines.next_line() => match line {
                            Ok(Some(line)) => Self::handle_line(id, &inner, &line).await,
                            // EOF or read error: the process is gone.
                            Ok(None) | Err(_) => break,
                        }
                    }
                }

                let code = child.wait().await.ok().and_then(|status| status.code());
                tlog_debug!("worker {} exited with code {:?}", id.short(), code);

                // Every queued call fails immediately with a crash-typed
                // reason; in-flight calls to other workers are unaffected.
                let mut inner = inner.lock().await;
                inner.alive = false;
                inner.stdin = None;
                while let Some(call) = inner.pending.pop_front() {
                    let _ = call.tx.send(Err(Error::WorkerCrashed(format!(
                        "worker {} exited with code {:?}",
                        id.short(),
                        code
                    ))));
                }
                drop(inner);

                let _ = events.send(WorkerEvent::Exited { id, code }).await;
            });
        }

        Ok(Self {
            id,
            inner,
            stderr_tail,
        })
    }

    async fn handle_line(id: WorkerId, inner: &Arc<Mutex<WorkerInner>>, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        match serde_json::from_str::<Value>(trimmed) {
            // A response that fails to parse is logged and dropped; the
            // matching call times out instead of receiving garbage.
            Err(_) => tlog_warn!("worker {}: dropped unparsable response line", id.short()),
            Ok(value) => {
                let mut inner = inner.lock().await;
                match inner.pending.pop_front() {
                    Some(call) => {
                        let _ = call.tx.send(Ok(value));
                    }
                    // Late response after a timeout removed its call.
                    None => tlog_debug!("worker {}: unmatched response line ignored", id.short()),
                }
            }
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Write one framed request and register a pending call.
    ///
    /// Returns the call's sequence number (for [`Self::abandon`]) and the
    /// receiver that resolves with the matched response line or a
    /// crash-typed failure. The per-worker lock is held across the write
    /// and the enqueue, so the reader cannot match a response before the
    /// call is queued.
    pub async fn dispatch(&self, request: &Value) -> Result<(u64, oneshot::Receiver<Result<Value>>)> {
        let line = serde_json::to_string(request)?;
        let mut inner = self.inner.lock().await;
        if !inner.alive {
            return Err(Error::WorkerUnavailable(format!(
                "worker {} is not running",
                self.id.short()
            )));
        }
        let stdin = inner
            .stdin
            .as_mut()
            .ok_or_else(|| Error::WorkerUnavailable("stdin closed".to_string()))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let (tx, rx) = oneshot::channel();
        inner.pending.push_back(PendingCall { seq, tx });
        Ok((seq, rx))
    }

    /// Remove a timed-out call from the queue.
    ///
    /// The worker process is not touched: a response may still arrive
    /// later and will be ignored as unmatched.
    pub async fn abandon(&self, seq: u64) {
        let mut inner = self.inner.lock().await;
        inner.pending.retain(|call| call.seq != seq);
    }

    /// Idle means live with no pending calls.
    pub async fn is_idle(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.alive && inner.pending.is_empty()
    }

    pub async fn is_alive(&self) -> bool {
        self.inner.lock().await.alive
    }

    /// Number of queued calls, for least-busy selection.
    pub async fn load(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// Most recent stderr lines, for diagnostics.
    pub fn stderr_tail(&self) -> Vec<String> {
        let tail = match self.stderr_tail.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tail.iter().cloned().collect()
    }
}
