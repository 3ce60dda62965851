//! Process bridge pool.
//!
//! The `BridgePool` presents a call-in/response-out interface backed by a
//! fixed-size set of supervised workers, hiding process lifecycle and
//! transient failure from the caller. `call()` never returns an error:
//! every failure mode degrades to a structurally valid fallback reply
//! carrying a typed reason, so the caller proceeds with reduced
//! confidence instead of failing the whole request.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::bridge::breaker::{BreakerState, CircuitBreaker};
use crate::bridge::worker::{Worker, WorkerEvent, WorkerId};
use crate::config::{PoolConfig, WorkerSpec};
use crate::{tlog_debug, tlog_error, tlog_warn, Result};

/// Why a call resolved with the fallback payload instead of a worker reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The circuit breaker rejected the call without dispatching it.
    BreakerOpen,
    /// The per-call budget elapsed before a response line arrived.
    Timeout,
    /// The worker exited before responding (or no worker was alive).
    WorkerCrashed,
    /// The request could not be written to the worker's input stream.
    WriteFailed,
    /// The request was not a JSON object.
    InvalidRequest,
}

/// Outcome of one bridge call. Structurally valid in every case.
#[derive(Debug, Clone)]
pub struct BridgeReply {
    /// The worker's response, or the configured neutral payload.
    pub payload: Value,
    /// Present iff the payload is the fallback.
    pub fallback: Option<FallbackReason>,
    pub latency_ms: u64,
}

impl BridgeReply {
    pub fn is_degraded(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Fixed-size pool of supervised workers for one logical endpoint.
pub struct BridgePool {
    config: PoolConfig,
    spec: WorkerSpec,
    /// Resolved once at construction; respawns reuse it.
    program: PathBuf,
    /// Neutral payload returned on every degraded path.
    fallback: Value,
    workers: RwLock<Vec<Arc<Worker>>>,
    breaker: Mutex<CircuitBreaker>,
    events_tx: mpsc::Sender<WorkerEvent>,
    cancel: CancellationToken,
    crash_count: AtomicU32,
}

impl BridgePool {
    /// Start `config.size` workers and the crash supervisor.
    ///
    /// The returned pool is meant to be injected where it is needed;
    /// lifecycle is owned by the service bootstrap, not a global.
    pub fn spawn(
        config: PoolConfig,
        spec: WorkerSpec,
        base_dir: &Path,
        fallback: Value,
    ) -> Result<Arc<Self>> {
        let program = spec.resolve(base_dir)?;
        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(64);

        let mut workers = Vec::with_capacity(config.size.max(1));
        for _ in 0..config.size.max(1) {
            let worker = Worker::spawn(&program, &spec, events_tx.clone(), cancel.child_token())?;
            workers.push(Arc::new(worker));
        }
        tlog_debug!(
            "bridge pool started: {} worker(s) running {}",
            workers.len(),
            program.display()
        );

        let breaker = CircuitBreaker::new(
            config.breaker.threshold,
            config.breaker.reset_after(),
        );
        let pool = Arc::new(Self {
            config,
            spec,
            program,
            fallback,
            workers: RwLock::new(workers),
            breaker: Mutex::new(breaker),
            events_tx,
            cancel,
            crash_count: AtomicU32::new(0),
        });

        tokio::spawn(Self::supervise(Arc::clone(&pool), events_rx));
        Ok(pool)
    }

    /// Crash supervisor: replaces dead workers after a fixed backoff.
    /// This is the only background operation not awaited by any caller.
    async fn supervise(pool: Arc<Self>, mut events: mpsc::Receiver<WorkerEvent>) {
        loop {
            tokio::select! {
                _ = pool.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(WorkerEvent::Exited { id, code }) => {
                        pool.replace_worker(id, code).await;
                    }
                    None => break,
                }
            }
        }
    }

    async fn replace_worker(&self, id: WorkerId, code: Option<i32>) {
        tlog_warn!(
            "bridge worker {} exited with code {:?}, respawning",
            id.short(),
            code
        );
        self.crash_count.fetch_add(1, Ordering::Relaxed);
        self.workers.write().await.retain(|w| w.id() != id);

        // Fixed backoff, then restore the pool size. Retries keep going
        // until a spawn sticks or the pool is shut down.
        loop {
            tokio::time::sleep(self.config.respawn_backoff()).await;
            if self.cancel.is_cancelled() {
                return;
            }
            match Worker::spawn(
                &self.program,
                &self.spec,
                self.events_tx.clone(),
                self.cancel.child_token(),
            ) {
                Ok(worker) => {
                    tlog_debug!("bridge worker {} replaces {}", worker.id().short(), id.short());
                    self.workers.write().await.push(Arc::new(worker));
                    return;
                }
                Err(e) => tlog_error!("bridge worker respawn failed: {}", e),
            }
        }
    }

    /// Dispatch one request and await its response.
    ///
    /// Never returns an error and never hangs: the reply resolves within
    /// the configured per-call budget plus scheduling slack.
    pub async fn call(&self, request: &Value) -> BridgeReply {
        let started = Instant::now();

        if !request.is_object() {
            return self.fallback_reply(FallbackReason::InvalidRequest, started);
        }

        if !self.breaker.lock().await.can_attempt() {
            return self.fallback_reply(FallbackReason::BreakerOpen, started);
        }

        let worker = match self.select_worker().await {
            Some(worker) => worker,
            None => {
                self.breaker.lock().await.record_failure();
                return self.fallback_reply(FallbackReason::WorkerCrashed, started);
            }
        };

        let (seq, rx) = match worker.dispatch(request).await {
            Ok(pair) => pair,
            Err(_) => {
                self.breaker.lock().await.record_failure();
                return self.fallback_reply(FallbackReason::WriteFailed, started);
            }
        };

        match tokio::time::timeout(self.config.call_timeout(), rx).await {
            // Timer fired first: remove the call from the queue, leave
            // the process alone. A late response is ignored as unmatched.
            Err(_) => {
                worker.abandon(seq).await;
                self.breaker.lock().await.record_failure();
                self.fallback_reply(FallbackReason::Timeout, started)
            }
            Ok(Err(_)) | Ok(Ok(Err(_))) => {
                self.breaker.lock().await.record_failure();
                self.fallback_reply(FallbackReason::WorkerCrashed, started)
            }
            Ok(Ok(Ok(payload))) => {
                self.breaker.lock().await.record_success();
                BridgeReply {
                    payload,
                    fallback: None,
                    latency_ms: crate::util::elapsed_ms(started),
                }
            }
        }
    }

    /// First idle worker, else the live worker with the shortest pending
    /// queue. Queuing against the least-busy worker avoids head-of-line
    /// blocking when every worker is occupied.
    async fn select_worker(&self) -> Option<Arc<Worker>> {
        let workers = self.workers.read().await;
        let mut least_busy: Option<(usize, Arc<Worker>)> = None;
        for worker in workers.iter() {
            if worker.is_idle().await {
                return Some(Arc::clone(worker));
            }
            if !worker.is_alive().await {
                continue;
            }
            let load = worker.load().await;
            let better = match &least_busy {
                Some((best, _)) => load < *best,
                None => true,
            };
            if better {
                least_busy = Some((load, Arc::clone(worker)));
            }
        }
        least_busy.map(|(_, worker)| worker)
    }

    fn fallback_reply(&self, reason: FallbackReason, started: Instant) -> BridgeReply {
        tlog_debug!("bridge call degraded: {:?}", reason);
        BridgeReply {
            payload: self.fallback.clone(),
            fallback: Some(reason),
            latency_ms: crate::util::elapsed_ms(started),
        }
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn breaker_state(&self) -> BreakerState {
        self.breaker.lock().await.state()
    }

    /// Total worker crashes observed since construction.
    pub fn crash_count(&self) -> u32 {
        self.crash_count.load(Ordering::Relaxed)
    }

    /// Stop the supervisor, reader tasks, and worker processes.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for BridgePool {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
