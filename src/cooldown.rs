//! Per-instance request rate limiting
//!
//! Tracks the instant of the most recent model call and delays new calls until
//! the configured cooldown has elapsed. The limiter throttles the shared
//! downstream API client, not individual users.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Enforces a minimum interval between consecutive model calls
#[derive(Debug)]
pub struct Cooldown {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Cooldown {
    /// Create a limiter with the given minimum interval between calls
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until the cooldown has elapsed, then stamp the current instant
    ///
    /// The remaining wait is recomputed against the moment this method runs,
    /// so time the caller already spent elsewhere counts toward the cooldown.
    /// The timestamp is updated exactly once, immediately before the caller
    /// issues its model call. An interval so large that the deadline overflows
    /// the clock is treated as already elapsed.
    pub async fn acquire(&self) {
        let wait = self
            .state()
            .and_then(|last| last.checked_add(self.interval))
            .and_then(|deadline| deadline.checked_duration_since(Instant::now()));
        if let Some(wait) = wait {
            warn!("Too frequent requests, waiting {:.2}s", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
        *self.state() = Some(Instant::now());
    }

    /// Instant of the most recently acquired call, if any
    #[must_use]
    pub fn last_request(&self) -> Option<Instant> {
        *self.state()
    }

    // The lock is only ever held for a read or a store, never across an await.
    fn state(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
