//! Error taxonomy shared by the request executor and the report controller.

use std::time::Duration;
use thiserror::Error;

use crate::types::ReportStatus;

/// Result alias used across the crate.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced to callers of the client.
///
/// Transient classes (`RateLimited`, `Server`, `Transport`) are only returned
/// once the retry budget is spent; the rest are returned on first sight.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 401/403, or a failed token exchange. Never retried.
    #[error("Authentication failed{}: {message}", fmt_status(.status))]
    Auth {
        status: Option<u16>,
        message: String,
    },

    /// HTTP 429 on every attempt.
    #[error("Rate limit exceeded after {attempts} attempts: {message}")]
    RateLimited {
        attempts: u32,
        message: String,
        retry_after: Option<Duration>,
    },

    /// A retryable status (5xx, or any other configured retryable status) on every attempt.
    #[error("Server error (HTTP {status}) after {attempts} attempts: {message}")]
    Server {
        status: u16,
        attempts: u32,
        message: String,
    },

    /// Connection or timeout failure on every attempt.
    #[error("Transport error after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Non-retryable 4xx: the request itself is wrong.
    #[error("Request error (HTTP {status}): {message}")]
    Client { status: u16, message: String },

    /// Report polling budget spent before the job reached a terminal status.
    #[error(
        "Report {job_id} not ready after {attempts} attempts ({elapsed:.1?}). Last status: {}",
        fmt_report_status(.last_status)
    )]
    ReportTimeout {
        job_id: String,
        attempts: u32,
        elapsed: Duration,
        last_status: Option<ReportStatus>,
    },

    /// The remote system reported the job as failed.
    #[error("Report {job_id} failed after {attempts} attempts ({elapsed:.1?})")]
    ReportFailed {
        job_id: String,
        attempts: u32,
        elapsed: Duration,
    },

    /// A caller precondition was violated; no network call was made.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The server answered successfully but the body was not what we expected.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The session's cancellation token fired while the call was suspended.
    #[error("Request cancelled")]
    Cancelled,
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

fn fmt_report_status(status: &Option<ReportStatus>) -> String {
    status.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string())
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Whether the error class is transient, i.e. retrying at a higher level may help.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Server { .. }
                | Self::Transport { .. }
                | Self::ReportTimeout { .. }
        )
    }

    /// HTTP status code carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } => *status,
            Self::RateLimited { .. } => Some(429),
            Self::Server { status, .. } | Self::Client { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Number of attempts made before the error was surfaced, if tracked.
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RateLimited { attempts, .. }
            | Self::Server { attempts, .. }
            | Self::Transport { attempts, .. }
            | Self::ReportTimeout { attempts, .. }
            | Self::ReportFailed { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
