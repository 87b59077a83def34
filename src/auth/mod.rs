//! Credential providers.
//!
//! A client is built with exactly one [`Credentials`] variant: fixed headers
//! (Seller API) or an OAuth client-credentials bearer token (Performance API).

mod token;

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::{PerformanceCredentials, SellerCredentials};
use crate::error::{ApiError, ApiResult};
use crate::http::HttpClient;

pub use token::{BearerToken, BearerTokenProvider, TOKEN_PATH, TOKEN_SAFETY_MARGIN};

/// Header carrying the seller client id.
pub const CLIENT_ID_HEADER: &str = "Client-Id";

/// Header carrying the seller API key.
pub const API_KEY_HEADER: &str = "Api-Key";

pub enum Credentials {
    Static(StaticHeaders),
    Bearer(BearerTokenProvider),
}

impl Credentials {
    pub fn seller(credentials: &SellerCredentials) -> ApiResult<Self> {
        Ok(Self::Static(StaticHeaders::from_seller(credentials)?))
    }

    pub fn performance(credentials: PerformanceCredentials) -> Self {
        Self::Bearer(BearerTokenProvider::new(credentials))
    }

    /// Headers to attach to the next network call.
    ///
    /// For bearer credentials this renews the token first when it is missing or stale.
    pub async fn headers(&self, http: &HttpClient) -> ApiResult<HeaderMap> {
        match self {
            Credentials::Static(headers) => Ok(headers.headers().clone()),
            Credentials::Bearer(provider) => provider.headers(http).await,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Static(_) => f.write_str("Credentials::Static"),
            Credentials::Bearer(_) => f.write_str("Credentials::Bearer"),
        }
    }
}

/// Fixed header map sent with every request.
#[derive(Clone, Default)]
pub struct StaticHeaders {
    headers: HeaderMap,
}

impl StaticHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header. Values are marked sensitive so they stay out of debug output.
    pub fn with_header(mut self, name: &str, value: &str) -> ApiResult<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ApiError::config(format!("Invalid header name {:?}: {}", name, e)))?;
        let mut value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::config(format!("Invalid value for header {}: {}", name, e)))?;
        value.set_sensitive(true);
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn from_seller(credentials: &SellerCredentials) -> ApiResult<Self> {
        debug!(
            "Using seller credentials for client {}",
            credentials.client_id
        );
        Self::new()
            .with_header(CLIENT_ID_HEADER, &credentials.client_id)?
            .with_header(API_KEY_HEADER, &credentials.api_key)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Masks a secret for logging, keeping a short prefix and suffix.
pub(crate) fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "*********".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}
