use log::{debug, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{
    ProgressEvent, ProgressObserver, ReportBackend, ReportJob, ReportOptions, ReportPart,
    ReportRequest, unbundle,
};
use crate::clock::{Clock, SystemClock, cancellable};
use crate::error::{ApiError, ApiResult};
use crate::types::ReportStatus;

/// Items accepted in one job.
pub const MAX_REPORT_ITEMS: usize = 10;

/// Drives a report job through submit, poll and fetch under an attempt budget.
pub struct ReportController {
    backend: Arc<dyn ReportBackend>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    max_items: usize,
}

impl ReportController {
    /// Controller over `backend` with the system clock and up to 10 items per job.
    pub fn new(backend: Arc<dyn ReportBackend>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
            max_items: MAX_REPORT_ITEMS,
        }
    }

    /// Replaces the clock used between polls.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Aborts a running job when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Overrides how many items one job may carry.
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Items accepted in one job.
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    fn validate(&self, request: &ReportRequest, options: &ReportOptions) -> ApiResult<()> {
        if request.items.is_empty() {
            return Err(ApiError::validation("Report request must name at least one item"));
        }
        if request.items.len() > self.max_items {
            return Err(ApiError::validation(format!(
                "Too many items in one report: {} (max {})",
                request.items.len(),
                self.max_items
            )));
        }
        if request.date_from > request.date_to {
            return Err(ApiError::validation(format!(
                "Report period starts after it ends: {} > {}",
                request.date_from, request.date_to
            )));
        }
        if options.max_attempts == 0 {
            return Err(ApiError::validation("max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Runs one job to completion and returns the unbundled parts.
    ///
    /// The observer sees every poll, including the one that produced the
    /// terminal status. There is no sleep after the last attempt.
    #[tracing::instrument(skip(self, observer), fields(items = request.items.len()))]
    pub async fn run(
        &self,
        request: &ReportRequest,
        options: ReportOptions,
        observer: Option<&dyn ProgressObserver>,
    ) -> ApiResult<Vec<ReportPart>> {
        self.validate(request, &options)?;

        let id = cancellable(&self.cancel, self.backend.submit(request)).await??;
        if id.trim().is_empty() {
            return Err(ApiError::invalid_response("Report job id is empty"));
        }
        let mut job = ReportJob::new(id, self.clock.now());
        debug!("Submitted report job {} for {} item(s)", job.id, request.items.len());

        while job.attempts < options.max_attempts {
            let status = cancellable(&self.cancel, self.backend.status(&job.id)).await??;
            job.attempts += 1;
            job.status = Some(status);

            let elapsed = self.clock.now().saturating_duration_since(job.submitted_at);
            let is_last = job.attempts >= options.max_attempts;
            let event = ProgressEvent {
                job_id: job.id.clone(),
                attempt: job.attempts,
                max_attempts: options.max_attempts,
                status,
                elapsed,
                next_poll_in: (!is_last).then_some(options.poll_interval),
            };
            debug!(
                "Report {} poll {}/{}: {}",
                job.id, event.attempt, event.max_attempts, status
            );
            if let Some(observer) = observer {
                observer.on_progress(&event);
            }

            match status {
                ReportStatus::Ready => {
                    let payload = cancellable(&self.cancel, self.backend.fetch(&job.id)).await??;
                    let parts = unbundle(&payload, &request.items)?;
                    info!(
                        "Report {} ready after {} poll(s): {} part(s)",
                        job.id,
                        job.attempts,
                        parts.len()
                    );
                    return Ok(parts);
                }
                ReportStatus::Failed => {
                    warn!("Report {} failed on the server", job.id);
                    return Err(ApiError::ReportFailed {
                        job_id: job.id,
                        attempts: job.attempts,
                        elapsed,
                    });
                }
                ReportStatus::Pending | ReportStatus::Running => {}
            }

            if !is_last {
                cancellable(&self.cancel, self.clock.sleep(options.poll_interval)).await?;
            }
        }

        let elapsed = self.clock.now().saturating_duration_since(job.submitted_at);
        warn!(
            "Report {} not ready after {} attempts ({:.1}s)",
            job.id,
            job.attempts,
            elapsed.as_secs_f64()
        );
        Err(ApiError::ReportTimeout {
            job_id: job.id,
            attempts: job.attempts,
            elapsed,
            last_status: job.status,
        })
    }
}

impl std::fmt::Debug for ReportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportController")
            .field("max_items", &self.max_items)
            .finish()
    }
}
