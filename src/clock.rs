//! Time abstraction for backoff sleeps, token expiry and report polling.
//!
//! Everything that waits or reads the current time goes through [`Clock`], so
//! tests can substitute a simulated clock.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs `fut` unless `cancel` fires first.
///
/// Dropping the losing future releases whatever it holds (permits, connections).
pub async fn cancellable<F, T>(cancel: &CancellationToken, fut: F) -> ApiResult<T>
where
    F: std::future::Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        value = fut => Ok(value),
    }
}
