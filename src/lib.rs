//! Resilient client for the Ozon Seller and Performance APIs.
//!
//! Every call goes through one [`http::HttpClient`]: a bounded-concurrency
//! gate, a credential provider (static API key headers or an OAuth bearer
//! token renewed ahead of expiry) and a retry loop with exponential backoff.
//! Long-running statistics reports are driven by [`report::ReportController`].

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod report;
pub mod session;
pub mod types;

pub use config::{ClientConfig, PerformanceCredentials, SellerCredentials};
pub use error::{ApiError, ApiResult};
pub use http::{ApiRequest, HttpClient, RawResponse, RetryPolicy};
pub use report::{ProgressEvent, ReportOptions, ReportPart, ReportRequest};
pub use session::{PerformanceClient, SellerClient, SessionOptions};
pub use types::{GroupBy, ReportStatus};
