//! HTTP request executor with rate limiting, credential injection and retry.

mod client;
mod limiter;
mod retry;

pub use client::{ApiRequest, HttpClient, RawResponse};
pub(crate) use client::Outcome;
pub use limiter::{MAX_CONCURRENT_REQUESTS, Permit, RateLimiter};
pub use retry::{
    BASE_DELAY, MAX_DELAY, MAX_RETRIES, RETRYABLE_STATUSES, RetryCause, RetryObserver,
    RetryPolicy, error_message, is_auth_failure, is_retryable_transport, parse_retry_after,
    terminal_error,
};
