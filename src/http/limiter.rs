//! Concurrency gate shared by every request issued through one client.

use log::debug;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{ApiError, ApiResult};

/// Default number of requests allowed in flight at once.
pub const MAX_CONCURRENT_REQUESTS: usize = 10;

/// Bounds the number of network calls in flight.
///
/// Each network call, retries included, takes its own [`Permit`]. Permits are
/// released on drop, so an early return or a cancelled future gives the slot back.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One unit of concurrency budget. Released when dropped.
#[derive(Debug)]
pub struct Permit {
    _inner: OwnedSemaphorePermit,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(MAX_CONCURRENT_REQUESTS)
    }
}

impl RateLimiter {
    /// Creates a limiter allowing `capacity` concurrent calls (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> ApiResult<Permit> {
        let inner = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ApiError::Cancelled)?;
        debug!(
            "Acquired request permit ({}/{} in flight)",
            self.in_flight(),
            self.capacity
        );
        Ok(Permit { _inner: inner })
    }

    /// Maximum number of concurrent calls.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of permits currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Rejects new acquisitions; pending and future `acquire` calls fail with `Cancelled`.
    pub fn close(&self) {
        self.semaphore.close();
    }
}
