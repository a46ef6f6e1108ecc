//! A small retry combinator replacing the source's per-call retry decorators.
//!
//! One generic function covers every quota-aware retry path in the engine
//! (store reads/writes, source API calls) instead of a decorator per call
//! site: caller supplies an async operation, a max attempt count, and the
//! initial delay; the delay doubles on each subsequent attempt.

use std::future::Future;
use std::time::Duration;

/// Runs `op` up to `max_attempts` times. On each failure the classifier
/// decides whether the error is retryable; a non-retryable error returns
/// immediately without waiting. `initial_delay` doubles after each retry.
pub async fn retry_with_backoff<T, E, Fut, Op, Retryable>(
    mut op: Op,
    max_attempts: u32,
    initial_delay: Duration,
    is_retryable: Retryable,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Retryable: Fn(&E) -> bool,
{
    let mut delay = initial_delay;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts || !is_retryable(&err) => return Err(err),
            Err(_) => {
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}
