//! Retry policy, backoff computation and response classification.

use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;

/// Maximum number of retries after the first attempt.
pub const MAX_RETRIES: u32 = 5;

/// Delay before the first retry.
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for any computed delay.
pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// Statuses retried by default.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Why an attempt is going to be retried.
#[derive(Debug)]
pub enum RetryCause {
    /// The server answered with a retryable status.
    Status {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },
    /// The request never produced a response (connect failure, timeout, broken body).
    Transport(reqwest::Error),
}

impl fmt::Display for RetryCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryCause::Status {
                status, message, ..
            } => write!(f, "HTTP {}: {}", status, message),
            RetryCause::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl RetryCause {
    /// Server-provided hint on how long to wait, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RetryCause::Status { retry_after, .. } => *retry_after,
            RetryCause::Transport(_) => None,
        }
    }

    /// Status of the failed attempt, if it got a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            RetryCause::Status { status, .. } => Some(*status),
            RetryCause::Transport(e) => e.status().map(|s| s.as_u16()),
        }
    }

    /// Converts the last observed cause into the error surfaced once the budget is spent.
    pub fn into_error(self, attempts: u32) -> ApiError {
        match self {
            RetryCause::Status {
                status: 429,
                message,
                retry_after,
            } => ApiError::RateLimited {
                attempts,
                message,
                retry_after,
            },
            RetryCause::Status {
                status, message, ..
            } => ApiError::Server {
                status,
                attempts,
                message,
            },
            RetryCause::Transport(source) => ApiError::Transport { attempts, source },
        }
    }
}

/// Observer notified before every backoff sleep.
///
/// Called synchronously on the request's task; it must return promptly.
pub trait RetryObserver: Send + Sync {
    fn on_retry(&self, attempt: u32, delay: Duration, cause: &RetryCause);
}

impl<F> RetryObserver for F
where
    F: Fn(u32, Duration, &RetryCause) + Send + Sync,
{
    fn on_retry(&self, attempt: u32, delay: Duration, cause: &RetryCause) {
        self(attempt, delay, cause)
    }
}

/// Immutable retry configuration shared by every request of a client.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    pub retryable_statuses: BTreeSet<u16>,
    pub on_retry: Option<Arc<dyn RetryObserver>>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .field("retryable_statuses", &self.retryable_statuses)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
            multiplier: 2.0,
            jitter: true,
            retryable_statuses: RETRYABLE_STATUSES.into_iter().collect(),
            on_retry: None,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Retries allowed after the first attempt.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the first backoff delay and the cap applied to every delay.
    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Growth factor between consecutive delays.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Toggles random shortening of each delay.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replaces the set of statuses that are retried.
    pub fn with_retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Installs a callback invoked before every backoff sleep.
    pub fn with_observer(mut self, observer: impl RetryObserver + 'static) -> Self {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    /// Rejects a multiplier below 1 and a base delay above the cap.
    pub fn validate(&self) -> Result<(), ApiError> {
        if !(self.multiplier >= 1.0) || !self.multiplier.is_finite() {
            return Err(ApiError::config(format!(
                "Retry multiplier must be a finite number >= 1, got {}",
                self.multiplier
            )));
        }
        if self.base_delay > self.max_delay {
            return Err(ApiError::config(format!(
                "Retry base delay {:?} exceeds max delay {:?}",
                self.base_delay, self.max_delay
            )));
        }
        Ok(())
    }

    /// Backoff delay after the attempt with index `attempt` (0-based) failed.
    ///
    /// `min(base_delay * multiplier^attempt, max_delay)`, scaled by a factor in
    /// `[0.5, 1.0)` when jitter is on.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.capped_delay(attempt);
        if self.jitter {
            let factor = rand::thread_rng().gen_range(0.5..1.0);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }

    fn capped_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        if !scaled.is_finite() || scaled >= max {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }

    /// Statuses that go back through the backoff loop. Auth failures never do.
    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        !is_auth_failure(status) && self.retryable_statuses.contains(&status.as_u16())
    }

    /// Delay actually slept before the next attempt.
    ///
    /// A server hint can lengthen the computed delay but never shorten it.
    pub fn effective_delay(&self, attempt: u32, cause: &RetryCause) -> Duration {
        let computed = self.delay_for(attempt);
        match cause.retry_after() {
            Some(hint) => hint.max(computed),
            None => computed,
        }
    }
}

/// 401 and 403. Never retried.
pub fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Transport-level failures worth another attempt.
pub fn is_retryable_transport(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request() || error.is_body()
}

/// Parses a `Retry-After` header given in whole seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Extracts a human-readable message from an error body.
///
/// Prefers the JSON `message` field, falls back to the raw text.
pub fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body)
        && let Some(msg) = value.get("message").and_then(|m| m.as_str())
    {
        return msg.to_string();
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        format!("API error: {}", status.as_u16())
    } else {
        text
    }
}

/// Classifies a non-success status that is not going to be retried.
pub fn terminal_error(status: StatusCode, message: String) -> ApiError {
    if is_auth_failure(status) {
        ApiError::Auth {
            status: Some(status.as_u16()),
            message,
        }
    } else {
        ApiError::Client {
            status: status.as_u16(),
            message,
        }
    }
}
