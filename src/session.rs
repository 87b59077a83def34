//! Session-scoped clients for the two API families.
//!
//! A session owns one transport, one rate limiter and one credential provider.
//! Dropping it releases all three.

use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::auth::Credentials;
use crate::clock::{Clock, SystemClock};
use crate::config::{ClientConfig, PerformanceCredentials, SellerCredentials};
use crate::error::ApiResult;
use crate::http::{ApiRequest, HttpClient, RawResponse};
use crate::report::{
    ProgressObserver, ReportController, ReportOptions, ReportPart, ReportRequest,
    StatisticsReports,
};

/// Options shared by both session kinds.
#[derive(Clone)]
pub struct SessionOptions {
    pub cancel: CancellationToken,
    pub clock: Arc<dyn Clock>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl SessionOptions {
    /// Cancels every call of the session when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replaces the clock used for backoff and polling.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

fn transport(
    config: &ClientConfig,
    credentials: Credentials,
    options: SessionOptions,
) -> ApiResult<Arc<HttpClient>> {
    let http = HttpClient::new(config, credentials)?
        .with_clock(options.clock)
        .with_cancellation(options.cancel);
    Ok(Arc::new(http))
}

/// Seller API session authenticated with static `Client-Id` / `Api-Key` headers.
#[derive(Debug)]
pub struct SellerClient {
    http: Arc<HttpClient>,
}

impl SellerClient {
    /// Opens a session with default options.
    pub async fn connect(config: ClientConfig, credentials: SellerCredentials) -> ApiResult<Self> {
        Self::connect_with(config, credentials, SessionOptions::default()).await
    }

    /// Opens a session with a custom clock or cancellation token.
    pub async fn connect_with(
        config: ClientConfig,
        credentials: SellerCredentials,
        options: SessionOptions,
    ) -> ApiResult<Self> {
        let http = transport(&config, Credentials::seller(&credentials)?, options)?;
        debug!("Seller session opened for {}", http.base_url());
        Ok(Self { http })
    }

    /// Connects to the production host with credentials from the environment.
    pub async fn from_env() -> ApiResult<Self> {
        Self::connect(ClientConfig::seller(), SellerCredentials::from_env()?).await
    }

    /// Underlying executor.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// GET with retry; decodes the JSON body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> ApiResult<T> {
        self.http.get(path, query).await
    }

    /// POST with a JSON body; decodes the JSON response.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.http.post(path, body).await
    }

    /// Runs a prepared request and decodes the JSON body.
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> ApiResult<T> {
        self.http.execute(request).await
    }

    /// Runs a prepared request and returns the body as bytes.
    pub async fn execute_raw(&self, request: &ApiRequest) -> ApiResult<RawResponse> {
        self.http.execute_raw(request).await
    }

    /// Cancels in-flight calls; later calls fail with `Cancelled`.
    pub fn close(&self) {
        self.http.close();
    }
}

/// Performance API session with a bearer token and statistics reports.
#[derive(Debug)]
pub struct PerformanceClient {
    http: Arc<HttpClient>,
    reports: ReportController,
}

impl PerformanceClient {
    /// Opens the session and issues the first access token.
    pub async fn connect(
        config: ClientConfig,
        credentials: PerformanceCredentials,
    ) -> ApiResult<Self> {
        Self::connect_with(config, credentials, SessionOptions::default()).await
    }

    /// Like [`PerformanceClient::connect`], with explicit session options.
    pub async fn connect_with(
        config: ClientConfig,
        credentials: PerformanceCredentials,
        options: SessionOptions,
    ) -> ApiResult<Self> {
        let http = transport(&config, Credentials::performance(credentials), options)?;
        if let Credentials::Bearer(provider) = http.credentials() {
            provider.access_token(&http).await?;
        }
        debug!("Performance session opened for {}", http.base_url());

        let reports = ReportController::new(Arc::new(StatisticsReports::new(http.clone())))
            .with_clock(http.shared_clock())
            .with_cancellation(http.cancellation().clone());
        Ok(Self { http, reports })
    }

    /// Connects to the production host with credentials from the environment.
    pub async fn from_env() -> ApiResult<Self> {
        Self::connect(
            ClientConfig::performance(),
            PerformanceCredentials::from_env()?,
        )
        .await
    }

    /// Underlying executor.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Report controller bound to the statistics endpoints.
    pub fn reports(&self) -> &ReportController {
        &self.reports
    }

    /// GET with retry; decodes the JSON body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> ApiResult<T> {
        self.http.get(path, query).await
    }

    /// POST with a JSON body; decodes the JSON response.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.http.post(path, body).await
    }

    /// Runs a prepared request and decodes the JSON body.
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> ApiResult<T> {
        self.http.execute(request).await
    }

    /// Generates a campaign statistics report and returns one part per campaign.
    pub async fn statistics_report(
        &self,
        request: &ReportRequest,
        options: ReportOptions,
        observer: Option<&dyn ProgressObserver>,
    ) -> ApiResult<Vec<ReportPart>> {
        self.reports.run(request, options, observer).await
    }

    /// Cancels in-flight calls and running report jobs.
    pub fn close(&self) {
        self.http.close();
    }
}
