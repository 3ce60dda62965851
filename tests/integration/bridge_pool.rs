//! Bridge pool supervision tests: timeouts, breaker behavior, respawn.

use std::path::Path;
use std::time::{Duration, Instant};

use serde_json::json;

use triage::bridge::{BreakerState, BridgePool, FallbackReason};
use triage::config::{BreakerConfig, PoolConfig};

use crate::fixtures::{neutral_fallback, sh_spec};

fn config(size: usize, timeout_ms: u64) -> PoolConfig {
    PoolConfig {
        size,
        call_timeout_ms: timeout_ms,
        respawn_backoff_ms: 50,
        breaker: BreakerConfig {
            threshold: 5,
            reset_ms: 30_000,
        },
    }
}

/// Test: call() never hangs
/// Given a worker that never responds
/// When call() is made with a short budget
/// Then the reply resolves within timeout + epsilon, degraded
#[tokio::test]
async fn test_call_never_hangs() {
    let pool = BridgePool::spawn(
        config(1, 100),
        sh_spec("sleep 600"),
        Path::new("."),
        neutral_fallback(),
    )
    .unwrap();

    let started = Instant::now();
    let reply = pool.call(&json!({"text": "anything"})).await;
    assert_eq!(reply.fallback, Some(FallbackReason::Timeout));
    assert_eq!(reply.payload, neutral_fallback());
    assert!(started.elapsed() < Duration::from_secs(1));
    pool.shutdown();
}

/// Test: crash mid-flight resolves queued calls and restores the pool
/// Given a worker that exits after its first request
/// When a call hits it
/// Then the call degrades with a crash reason and the pool size recovers
#[tokio::test]
async fn test_crash_resolves_calls_and_pool_recovers() {
    let pool = BridgePool::spawn(
        config(2, 2_000),
        sh_spec("read line; exit 9"),
        Path::new("."),
        neutral_fallback(),
    )
    .unwrap();

    let reply = pool.call(&json!({"text": "first"})).await;
    assert_eq!(reply.fallback, Some(FallbackReason::WorkerCrashed));

    // Pool size returns to 2 within the respawn backoff window.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(pool.worker_count().await, 2);
    assert!(pool.crash_count() >= 1);
    pool.shutdown();
}

/// Test: breaker opens, rejects, and recovers monotonically
/// Given threshold 2 and a 200ms reset window
/// When two calls time out
/// Then the third is rejected immediately and a call after the window
/// is attempted again
#[tokio::test]
async fn test_breaker_open_and_lazy_half_open() {
    let mut pool_config = config(1, 50);
    pool_config.breaker = BreakerConfig {
        threshold: 2,
        reset_ms: 200,
    };
    let pool = BridgePool::spawn(
        pool_config,
        sh_spec("sleep 600"),
        Path::new("."),
        neutral_fallback(),
    )
    .unwrap();

    assert_eq!(
        pool.call(&json!({})).await.fallback,
        Some(FallbackReason::Timeout)
    );
    assert_eq!(
        pool.call(&json!({})).await.fallback,
        Some(FallbackReason::Timeout)
    );
    assert_eq!(pool.breaker_state().await, BreakerState::Open);

    // Open breaker: rejected without dispatching.
    let started = Instant::now();
    assert_eq!(
        pool.call(&json!({})).await.fallback,
        Some(FallbackReason::BreakerOpen)
    );
    assert!(started.elapsed() < Duration::from_millis(40));

    // After the reset window the next call is the trial attempt; it is
    // dispatched (and times out again) instead of being rejected.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(
        pool.call(&json!({})).await.fallback,
        Some(FallbackReason::Timeout)
    );
    pool.shutdown();
}

/// Test: all-busy pool queues rather than failing
/// Given a single echo worker
/// When three calls run concurrently
/// Then all three resolve with real payloads (FIFO pipelining)
#[tokio::test]
async fn test_concurrent_calls_queue_fifo() {
    let pool = BridgePool::spawn(
        config(1, 2_000),
        triage::config::WorkerSpec::new("cat"),
        Path::new("."),
        neutral_fallback(),
    )
    .unwrap();

    let j1 = json!({"n": 1});
    let j2 = json!({"n": 2});
    let j3 = json!({"n": 3});
    let (a, b, c) = tokio::join!(
        pool.call(&j1),
        pool.call(&j2),
        pool.call(&j3),
    );
    assert!(!a.is_degraded());
    assert!(!b.is_degraded());
    assert!(!c.is_degraded());
    pool.shutdown();
}

/// Test: the pool keeps serving after one worker crashes
/// Given two workers that answer one request and crash on the next
/// When a crash takes out the first worker
/// Then the next call is served by the survivor
#[tokio::test]
async fn test_crash_does_not_disturb_other_workers() {
    let pool = BridgePool::spawn(
        config(2, 2_000),
        sh_spec(r#"read line; echo '{"ok":true}'; read line; exit 5"#),
        Path::new("."),
        neutral_fallback(),
    )
    .unwrap();

    // First call: served by the first worker, which then idles.
    let ok = pool.call(&json!({"n": 1})).await;
    assert!(!ok.is_degraded());

    // Second call: same worker reads its second line and exits.
    let crashed = pool.call(&json!({"n": 2})).await;
    assert_eq!(crashed.fallback, Some(FallbackReason::WorkerCrashed));

    // Third call: the untouched second worker serves it.
    let survivor = pool.call(&json!({"n": 3})).await;
    assert!(!survivor.is_degraded());
    pool.shutdown();
}
