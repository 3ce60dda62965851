//! Resilient process bridge.
//!
//! This module provides the pool of long-lived external worker processes
//! used for the low-latency classifier path: line-framed JSON over the
//! worker's standard streams, a circuit breaker per endpoint, per-call
//! timeouts, and automatic respawn on crash.

mod breaker;
mod pool;
mod worker;

pub use breaker::{BreakerState, CircuitBreaker, DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_AFTER};
pub use pool::{BridgePool, BridgeReply, FallbackReason};
pub use worker::{Worker, WorkerEvent, WorkerId};
