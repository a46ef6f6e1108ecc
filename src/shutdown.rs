//! Cooperative shutdown signal shared by every long-running task.
//!
//! A single atomic flag set by the signal handler, polled at every
//! suspension point named in the concurrency model (sleeps, HTTP calls,
//! cache/store calls). Wraps a [`tokio::sync::Notify`] so a sleeping task
//! (e.g. the rate limiter) wakes immediately instead of waiting out its
//! full delay once shutdown is requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::ShutdownRequested;

#[derive(Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sets the flag and wakes every task parked in [`Self::sleep`].
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Sleeps for `dur` unless shutdown is requested first, in which case it
    /// returns early with [`ShutdownRequested`]. A reusable cancellable delay
    /// used at every suspension point throughout the engine.
    pub async fn sleep(&self, dur: Duration) -> Result<(), ShutdownRequested> {
        if self.requested() {
            return Err(ShutdownRequested);
        }
        tokio::select! {
            _ = tokio::time::sleep(dur) => Ok(()),
            _ = self.notify.notified() => Err(ShutdownRequested),
        }
    }

    pub fn check(&self) -> Result<(), ShutdownRequested> {
        if self.requested() {
            Err(ShutdownRequested)
        } else {
            Ok(())
        }
    }

    /// Resolves once shutdown has been requested. Returns immediately if it
    /// already was; intended for use as one branch of a `tokio::select!`
    /// alongside a periodic timer or other suspension point.
    pub async fn wait_for_trigger(&self) {
        if self.requested() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
