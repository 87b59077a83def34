//! Client configuration and credential loading.

use std::fmt;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};
use crate::http::{MAX_CONCURRENT_REQUESTS, RetryPolicy};

/// Seller API host.
pub const SELLER_BASE_URL: &str = "https://api-seller.ozon.ru";

/// Performance (advertising) API host.
pub const PERFORMANCE_BASE_URL: &str = "https://api-performance.ozon.ru";

/// Per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const SELLER_CLIENT_ID_ENV: &str = "OZON_SELLER_CLIENT_ID";
pub const SELLER_API_KEY_ENV: &str = "OZON_SELLER_API_KEY";
pub const PERF_CLIENT_ID_ENV: &str = "OZON_PERF_CLIENT_ID";
pub const PERF_CLIENT_SECRET_ENV: &str = "OZON_PERF_CLIENT_SECRET";

/// Transport and retry settings for one client session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_concurrent_requests: usize,
    pub retry: RetryPolicy,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            max_concurrent_requests: MAX_CONCURRENT_REQUESTS,
            retry: RetryPolicy::default(),
            user_agent: format!("ozon-client/{}", env!("OZON_CLIENT_VERSION")),
        }
    }

    pub fn seller() -> Self {
        Self::new(SELLER_BASE_URL)
    }

    pub fn performance() -> Self {
        Self::new(PERFORMANCE_BASE_URL)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn validate(&self) -> ApiResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ApiError::config(format!(
                "Base URL must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        if self.max_concurrent_requests == 0 {
            return Err(ApiError::config(
                "max_concurrent_requests must be at least 1",
            ));
        }
        if self.timeout.is_zero() {
            return Err(ApiError::config("timeout must be greater than zero"));
        }
        self.retry.validate()
    }
}

/// Static Seller API credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct SellerCredentials {
    pub client_id: String,
    pub api_key: String,
}

impl SellerCredentials {
    pub fn new(client_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            api_key: api_key.into(),
        }
    }

    /// Reads `OZON_SELLER_CLIENT_ID` and `OZON_SELLER_API_KEY`.
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            client_id: required(&lookup, SELLER_CLIENT_ID_ENV)?,
            api_key: required(&lookup, SELLER_API_KEY_ENV)?,
        })
    }
}

impl fmt::Debug for SellerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SellerCredentials")
            .field("client_id", &self.client_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// OAuth client credentials for the Performance API.
#[derive(Clone, PartialEq, Eq)]
pub struct PerformanceCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl PerformanceCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Reads `OZON_PERF_CLIENT_ID` and `OZON_PERF_CLIENT_SECRET`.
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            client_id: required(&lookup, PERF_CLIENT_ID_ENV)?,
            client_secret: required(&lookup, PERF_CLIENT_SECRET_ENV)?,
        })
    }
}

impl fmt::Debug for PerformanceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

fn required<F>(lookup: &F, key: &str) -> ApiResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ApiError::config(format!(
            "Missing environment variable {}",
            key
        ))),
    }
}
