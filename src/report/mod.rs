//! Asynchronous report jobs: submit, poll until ready, fetch and unbundle.

mod bundle;
mod controller;
mod statistics;

pub use bundle::{ReportPart, unbundle};
pub use controller::{MAX_REPORT_ITEMS, ReportController};
pub use statistics::{
    STATISTICS_PATH, STATISTICS_REPORT_PATH, STATISTICS_STATUS_PATH, StatisticsReports,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::ApiResult;
use crate::types::{GroupBy, ReportStatus};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Parameters of one report job. `items` are the sub-identifiers (campaign ids).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub items: Vec<String>,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub group_by: GroupBy,
}

impl ReportRequest {
    pub fn new<I, S>(items: I, date_from: NaiveDate, date_to: NaiveDate) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect(),
            date_from,
            date_to,
            group_by: GroupBy::default(),
        }
    }

    pub fn with_group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = group_by;
        self
    }
}

/// Polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub max_attempts: u32,
    pub poll_interval: Duration,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ReportOptions {
    pub fn new(max_attempts: u32, poll_interval: Duration) -> Self {
        Self {
            max_attempts,
            poll_interval,
        }
    }
}

/// A submitted job as seen by the controller.
#[derive(Debug, Clone)]
pub struct ReportJob {
    pub id: String,
    pub submitted_at: Instant,
    pub status: Option<ReportStatus>,
    pub attempts: u32,
}

impl ReportJob {
    pub fn new(id: impl Into<String>, submitted_at: Instant) -> Self {
        Self {
            id: id.into(),
            submitted_at,
            status: None,
            attempts: 0,
        }
    }
}

/// Snapshot handed to the progress observer after every poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub job_id: String,
    /// 1-based.
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: ReportStatus,
    pub elapsed: Duration,
    /// `None` on the last attempt.
    pub next_poll_in: Option<Duration>,
}

/// Receives one event per poll, synchronously, before the terminal check.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Body returned by the fetch step, before unbundling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportPayload {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ReportPayload {
    pub fn new(content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    pub fn is_zip(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("zip"))
    }
}

/// Remote side of a report job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportBackend: Send + Sync {
    /// Submits the job and returns its opaque id.
    async fn submit(&self, request: &ReportRequest) -> ApiResult<String>;

    async fn status(&self, job_id: &str) -> ApiResult<ReportStatus>;

    async fn fetch(&self, job_id: &str) -> ApiResult<ReportPayload>;
}
