//! Sliding-window rate limiter shared across every external-API caller.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::ShutdownRequested;
use crate::shutdown::ShutdownSignal;

const WINDOW: Duration = Duration::from_secs(60);

/// Guards the timestamp deque with a `parking_lot::Mutex` held only around
/// the list mutation; the computed wait happens after the lock is dropped so
/// a sleeping caller never blocks a concurrent `acquire`.
pub struct RateLimiter {
    max_per_window: usize,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_per_window: usize) -> Self {
        Self {
            max_per_window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_per_window)),
        }
    }

    /// Waits, if necessary, then records a new call timestamp. Returns
    /// early without recording if `shutdown` fires during the wait.
    pub async fn acquire(&self, shutdown: &ShutdownSignal) -> Result<(), ShutdownRequested> {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock();
                let now = Instant::now();
                while let Some(&front) = timestamps.front() {
                    if now.duration_since(front) >= WINDOW {
                        timestamps.pop_front();
                    } else {
                        break;
                    }
                }
                if timestamps.len() < self.max_per_window {
                    timestamps.push_back(now);
                    return Ok(());
                }
                let oldest = *timestamps.front().expect("window is full");
                WINDOW.saturating_sub(now.duration_since(oldest))
            };
            shutdown.sleep(wait).await?;
        }
    }
}
