//! Campaign statistics reports of the Performance API.

use async_trait::async_trait;
use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ReportBackend, ReportPayload, ReportRequest};
use crate::error::{ApiError, ApiResult};
use crate::http::{ApiRequest, HttpClient};
use crate::types::{GroupBy, ReportStatus};

pub const STATISTICS_PATH: &str = "/api/client/statistics";
pub const STATISTICS_STATUS_PATH: &str = "/api/client/statistics/";
pub const STATISTICS_REPORT_PATH: &str = "/api/client/statistics/report";

#[derive(Serialize)]
struct SubmitBody<'a> {
    campaigns: &'a [String],
    from: String,
    to: String,
    #[serde(rename = "groupBy")]
    group_by: GroupBy,
}

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(rename = "UUID")]
    uuid: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    state: Option<String>,
}

pub(crate) fn start_of_day(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", date.format("%Y-%m-%d"))
}

pub(crate) fn end_of_day(date: NaiveDate) -> String {
    format!("{}T23:59:59.999999Z", date.format("%Y-%m-%d"))
}

/// Report backend over the statistics endpoints.
#[derive(Debug, Clone)]
pub struct StatisticsReports {
    http: Arc<HttpClient>,
}

impl StatisticsReports {
    /// Backend sharing the session's executor.
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ReportBackend for StatisticsReports {
    #[tracing::instrument(skip(self, request))]
    async fn submit(&self, request: &ReportRequest) -> ApiResult<String> {
        let body = SubmitBody {
            campaigns: &request.items,
            from: start_of_day(request.date_from),
            to: end_of_day(request.date_to),
            group_by: request.group_by,
        };
        let response: SubmitResponse = self.http.post(STATISTICS_PATH, &body).await?;
        response
            .uuid
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::invalid_response("Report UUID not found in API response"))
    }

    async fn status(&self, job_id: &str) -> ApiResult<ReportStatus> {
        let path = format!("{}{}", STATISTICS_STATUS_PATH, job_id);
        let response: StatusResponse = self.http.get(&path, &[]).await?;
        let state = response.state.unwrap_or_default();
        Ok(state.parse().unwrap_or_else(|_| {
            warn!("Report {}: unknown state {:?}, treating as pending", job_id, state);
            ReportStatus::Pending
        }))
    }

    async fn fetch(&self, job_id: &str) -> ApiResult<ReportPayload> {
        let request = ApiRequest::get(STATISTICS_REPORT_PATH).with_query("UUID", job_id);
        let response = self.http.execute_raw(&request).await?;
        Ok(ReportPayload {
            content_type: response.content_type().map(str::to_string),
            body: response.body,
        })
    }
}
