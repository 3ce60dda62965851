//! Shared utility functions.

use std::time::{Duration, Instant};

use tokio::task::spawn_blocking;
use tokio::time::timeout;

use crate::{Error, Result};

/// Milliseconds elapsed since `started`, saturated into a u64.
///
/// Latency fields across the crate (bridge replies, agent results) are
/// all derived through this one conversion.
pub fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

pub async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))?
}

pub async fn blocking_with_timeout<F, T>(duration: Duration, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match timeout(duration, spawn_blocking(f)).await {
        Ok(Ok(inner)) => inner,
        Ok(Err(join_err)) => Err(Error::TaskJoin(join_err.to_string())),
        Err(_) => Err(Error::Timeout(duration)),
    }
}
