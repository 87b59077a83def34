use log::{debug, warn};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::mask_secret;
use crate::clock::cancellable;
use crate::config::PerformanceCredentials;
use crate::error::{ApiError, ApiResult};
use crate::http::{ApiRequest, HttpClient, Outcome};

/// Token issuance endpoint of the Performance API.
pub const TOKEN_PATH: &str = "/api/client/token";

/// Tokens are renewed this long before their literal expiry.
pub const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime assumed when the server omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 1800;

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// An issued access token.
#[derive(Clone)]
pub struct BearerToken {
    pub access_token: String,
    /// Renewal deadline; already includes the safety margin.
    pub expires_at: Instant,
}

impl BearerToken {
    /// Whether the token can still be sent at `now`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("access_token", &mask_secret(&self.access_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Cached token plus the outcome of the last failed renewal.
#[derive(Default)]
struct TokenState {
    token: Option<BearerToken>,
    failure: Option<(Option<u16>, String)>,
}

/// OAuth client-credentials token source with proactive, single-flight renewal.
///
/// The cached state lives behind an async mutex held across the exchange, so
/// callers arriving during a renewal wait for it and share its outcome,
/// whether a token or an auth failure.
pub struct BearerTokenProvider {
    credentials: PerformanceCredentials,
    token_path: String,
    safety_margin: Duration,
    state: Mutex<TokenState>,
    exchanges: AtomicU64,
    renewals: AtomicU64,
}

impl BearerTokenProvider {
    pub fn new(credentials: PerformanceCredentials) -> Self {
        Self {
            credentials,
            token_path: TOKEN_PATH.to_string(),
            safety_margin: TOKEN_SAFETY_MARGIN,
            state: Mutex::new(TokenState::default()),
            exchanges: AtomicU64::new(0),
            renewals: AtomicU64::new(0),
        }
    }

    /// Renews tokens this long before they expire.
    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    /// Uses a different token issuance endpoint.
    pub fn with_token_path(mut self, path: impl Into<String>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Number of token exchanges performed so far.
    pub fn exchanges(&self) -> u64 {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub(crate) async fn headers(&self, http: &HttpClient) -> ApiResult<HeaderMap> {
        let token = self.access_token(http).await?;
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ApiError::invalid_response(format!("Access token is not a valid header: {}", e)))?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// Returns a fresh access token, renewing it first if needed.
    ///
    /// A caller that queued behind a renewal gets that renewal's outcome; it
    /// never starts a second exchange for the same expiry.
    #[tracing::instrument(skip(self, http))]
    pub async fn access_token(&self, http: &HttpClient) -> ApiResult<String> {
        let seen = self.renewals.load(Ordering::SeqCst);
        let mut state = cancellable(http.cancellation(), self.state.lock()).await?;

        if let Some(token) = state.token.as_ref()
            && token.is_fresh(http.clock().now())
        {
            return Ok(token.access_token.clone());
        }
        if self.renewals.load(Ordering::SeqCst) != seen
            && let Some((status, message)) = state.failure.as_ref()
        {
            debug!("Token renewal failed while waiting, sharing its outcome");
            return Err(ApiError::Auth {
                status: *status,
                message: message.clone(),
            });
        }

        let result = self.exchange(http).await;
        self.renewals.fetch_add(1, Ordering::SeqCst);
        match result {
            Ok(token) => {
                let access_token = token.access_token.clone();
                state.token = Some(token);
                state.failure = None;
                Ok(access_token)
            }
            Err(ApiError::Auth { status, message }) => {
                state.failure = Some((status, message.clone()));
                Err(ApiError::Auth { status, message })
            }
            Err(e) => {
                state.failure = None;
                Err(e)
            }
        }
    }

    /// Drops the cached token so the next call performs a new exchange.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.token = None;
        state.failure = None;
    }

    async fn exchange(&self, http: &HttpClient) -> ApiResult<BearerToken> {
        debug!("Requesting access token from {}...", self.token_path);
        self.exchanges.fetch_add(1, Ordering::SeqCst);

        let body = serde_json::to_value(TokenRequest {
            client_id: &self.credentials.client_id,
            client_secret: &self.credentials.client_secret,
            grant_type: "client_credentials",
        })
        .map_err(|e| ApiError::config(format!("Failed to encode token request: {}", e)))?;
        let request = ApiRequest::new(Method::POST, &self.token_path).with_json(body);

        // Token failures are terminal: a single attempt, any failure is an auth error.
        let response = match http.send_once(&request, &HeaderMap::new(), 0).await {
            Outcome::Success(response) => response,
            Outcome::Retryable(cause) => {
                warn!("Token request failed: {}", cause);
                return Err(ApiError::Auth {
                    status: cause.status(),
                    message: format!("Failed to obtain access token: {}", cause),
                });
            }
            Outcome::Terminal(ApiError::Cancelled) => return Err(ApiError::Cancelled),
            Outcome::Terminal(e) => {
                warn!("Token request failed: {}", e);
                return Err(ApiError::Auth {
                    status: e.status(),
                    message: format!("Failed to obtain access token: {}", e),
                });
            }
        };

        let parsed: TokenResponse = response.json().map_err(|e| ApiError::Auth {
            status: Some(response.status.as_u16()),
            message: format!("Malformed token response: {}", e),
        })?;

        let lifetime =
            Duration::from_secs(parsed.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));
        let expires_at = http.clock().now() + lifetime.saturating_sub(self.safety_margin);

        debug!(
            "Obtained access token {} valid for {}s",
            mask_secret(&parsed.access_token),
            lifetime.as_secs()
        );

        Ok(BearerToken {
            access_token: parsed.access_token,
            expires_at,
        })
    }
}
