//! Request executor: one logical call in, one reliably delivered exchange out.

use log::{debug, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::limiter::RateLimiter;
use super::retry::{
    RetryCause, RetryPolicy, error_message, is_retryable_transport, parse_retry_after,
    terminal_error,
};
use crate::auth::Credentials;
use crate::clock::{Clock, SystemClock, cancellable};
use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};

/// One logical API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl ApiRequest {
    /// Request without query, headers or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            query: Vec::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Shorthand for a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Shorthand for a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Sets the JSON body.
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Appends a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds a header that overrides any default or credential header of the same name.
    pub fn with_header(mut self, name: &str, value: &str) -> ApiResult<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ApiError::validation(format!("Invalid header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::validation(format!("Invalid value for header {}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }
}

/// A successful response, fully read.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Value of the `Content-Type` header, if present and valid.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Decodes the body as JSON. An empty body decodes as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        let body: &[u8] = if self.body.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &self.body
        };
        serde_json::from_slice(body)
            .map_err(|e| ApiError::invalid_response(format!("Failed to parse JSON response: {}", e)))
    }

    /// Decodes the body as UTF-8.
    pub fn text(&self) -> ApiResult<String> {
        String::from_utf8(self.body.clone())
            .map_err(|e| ApiError::invalid_response(format!("Response is not valid UTF-8: {}", e)))
    }
}

/// Classification of a single network attempt.
#[derive(Debug)]
pub(crate) enum Outcome {
    Success(RawResponse),
    Retryable(RetryCause),
    Terminal(ApiError),
}

/// HTTP client with built-in rate limiting, credential injection and retry.
///
/// Owns the connection pool, the rate limiter and the credential provider for
/// the lifetime of a session; all of them are released when it is dropped.
pub struct HttpClient {
    client: Client,
    base_url: String,
    limiter: RateLimiter,
    policy: RetryPolicy,
    credentials: Credentials,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl HttpClient {
    /// Validates `config` and builds the underlying connection pool.
    pub fn new(config: &ClientConfig, credentials: Credentials) -> ApiResult<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(config.max_concurrent_requests),
            policy: config.retry.clone(),
            credentials,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
        })
    }

    /// Replaces the clock used for backoff sleeps and token expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Ties every suspension point of this client to `cancel`.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Host every request path is joined to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Retry settings applied to every call.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Shared concurrency limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Credentials attached to each attempt.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Clock used for backoff and expiry.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Owned handle to the same clock.
    pub fn shared_clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Token that aborts this client's calls.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancels in-flight calls and refuses new ones.
    pub fn close(&self) {
        self.cancel.cancel();
        self.limiter.close();
    }

    /// Performs a GET request and deserializes the JSON response.
    #[tracing::instrument(skip(self, query))]
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> ApiResult<T> {
        let mut request = ApiRequest::get(path);
        for (key, value) in query {
            request = request.with_query(*key, *value);
        }
        self.execute(&request).await
    }

    /// Performs a POST request with a JSON body and deserializes the JSON response.
    #[tracing::instrument(skip(self, body))]
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::validation(format!("Failed to encode request body: {}", e)))?;
        self.execute(&ApiRequest::post(path).with_json(body)).await
    }

    /// Executes a request with retry and deserializes the JSON response.
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> ApiResult<T> {
        self.execute_raw(request).await?.json()
    }

    /// Executes a request with retry and returns the raw response.
    ///
    /// Attempts run strictly one after another, up to `max_retries + 1` of them.
    /// Auth failures and other terminal statuses are returned immediately.
    #[tracing::instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn execute_raw(&self, request: &ApiRequest) -> ApiResult<RawResponse> {
        let max_retries = self.policy.max_retries;
        let mut attempt: u32 = 0;

        loop {
            let auth = self.credentials.headers(self).await?;

            match self.send_once(request, &auth, attempt).await {
                Outcome::Success(response) => {
                    debug!(
                        "{} {}: HTTP {} after {} attempt(s)",
                        request.method,
                        request.path,
                        response.status.as_u16(),
                        attempt + 1
                    );
                    return Ok(response);
                }
                Outcome::Terminal(e) => {
                    debug!("{} {}: non-retryable error: {}", request.method, request.path, e);
                    return Err(e);
                }
                Outcome::Retryable(cause) => {
                    if attempt >= max_retries {
                        warn!(
                            "{} {}: giving up after {} attempts ({})",
                            request.method,
                            request.path,
                            attempt + 1,
                            cause
                        );
                        return Err(cause.into_error(attempt + 1));
                    }

                    let delay = self.policy.effective_delay(attempt, &cause);
                    warn!(
                        "{} {}: attempt {}/{} failed ({}), retrying in {}ms...",
                        request.method,
                        request.path,
                        attempt + 1,
                        max_retries + 1,
                        cause,
                        delay.as_millis()
                    );
                    if let Some(observer) = &self.policy.on_retry {
                        observer.on_retry(attempt + 1, delay, &cause);
                    }

                    cancellable(&self.cancel, self.clock.sleep(delay)).await?;
                    attempt += 1;
                }
            }
        }
    }

    /// Single network attempt: take a permit, send, read the body, release, classify.
    pub(crate) async fn send_once(
        &self,
        request: &ApiRequest,
        auth: &HeaderMap,
        attempt: u32,
    ) -> Outcome {
        let result = match cancellable(&self.cancel, self.transmit(request, auth)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) | Err(e) => return Outcome::Terminal(e),
        };

        match result {
            Ok(response) => self.classify(response),
            Err(e) if is_retryable_transport(&e) => Outcome::Retryable(RetryCause::Transport(e)),
            Err(e) => Outcome::Terminal(ApiError::Transport {
                attempts: attempt + 1,
                source: e,
            }),
        }
    }

    /// Holds a permit from before the send until the body is fully read.
    async fn transmit(
        &self,
        request: &ApiRequest,
        auth: &HeaderMap,
    ) -> ApiResult<Result<RawResponse, reqwest::Error>> {
        let _permit = self.limiter.acquire().await?;
        let response = match self.build(request, auth).send().await {
            Ok(response) => response,
            Err(e) => return Ok(Err(e)),
        };
        let status = response.status();
        let headers = response.headers().clone();
        Ok(response.bytes().await.map(|body| RawResponse {
            status,
            headers,
            body: body.to_vec(),
        }))
    }

    fn build(&self, request: &ApiRequest, auth: &HeaderMap) -> reqwest::RequestBuilder {
        let url = if request.path.starts_with('/') {
            format!("{}{}", self.base_url, request.path)
        } else {
            format!("{}/{}", self.base_url, request.path)
        };

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(auth.clone())
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder
    }

    fn classify(&self, response: RawResponse) -> Outcome {
        let status = response.status;
        if status.is_success() {
            return Outcome::Success(response);
        }

        let message = error_message(status, &response.body);
        if self.policy.is_retryable_status(status) {
            Outcome::Retryable(RetryCause::Status {
                status: status.as_u16(),
                message,
                retry_after: parse_retry_after(&response.headers),
            })
        } else {
            Outcome::Terminal(terminal_error(status, message))
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("limiter", &self.limiter)
            .field("policy", &self.policy)
            .field("credentials", &self.credentials)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::config::SellerCredentials;
    use crate::http::RetryCause;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn seller_credentials() -> Credentials {
        Credentials::seller(&SellerCredentials::new("123456", "test-key")).unwrap()
    }

    fn instant_clock() -> MockClock {
        let mut clock = MockClock::new();
        clock.expect_now().returning(tokio::time::Instant::now);
        clock.expect_sleep().returning(|_| ());
        clock
    }

    fn client_with(url: String, policy: RetryPolicy) -> HttpClient {
        let config = ClientConfig::new(url).with_retry(policy);
        HttpClient::new(&config, seller_credentials())
            .unwrap()
            .with_clock(Arc::new(instant_clock()))
    }

    fn counting_policy(max_retries: u32, calls: Arc<AtomicU32>) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(max_retries)
            .with_jitter(false)
            .with_observer(move |_: u32, _: Duration, _: &RetryCause| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
    }

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct TestResponse {
        name: String,
        value: i32,
    }

    #[tokio::test]
    async fn test_get_json_success_with_static_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/test")
            .match_header("Client-Id", "123456")
            .match_header("Api-Key", "test-key")
            .match_header("Content-Type", "application/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "test", "value": 42}"#)
            .create_async()
            .await;

        let client = client_with(server.url(), RetryPolicy::default());
        let result: TestResponse = client.get("/v1/test", &[]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            result,
            TestResponse {
                name: "test".to_string(),
                value: 42
            }
        );
    }

    #[tokio::test]
    async fn test_get_with_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/client/campaign?page=1&pageSize=100")
            .with_status(200)
            .with_body(r#"{"list": []}"#)
            .create_async()
            .await;

        let client = client_with(server.url(), RetryPolicy::default());
        let result: serde_json::Value = client
            .get("/api/client/campaign", &[("page", "1"), ("pageSize", "100")])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, serde_json::json!({"list": []}));
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/product/list")
            .match_body(mockito::Matcher::Json(serde_json::json!({"limit": 100})))
            .with_status(200)
            .with_body(r#"{"result": {"items": []}}"#)
            .create_async()
            .await;

        let client = client_with(server.url(), RetryPolicy::default());
        let result: serde_json::Value = client
            .post("/v2/product/list", &serde_json::json!({"limit": 100}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result["result"]["items"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_extra_headers_override_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/test")
            .match_header("Client-Id", "other")
            .match_header("X-Trace", "abc")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = client_with(server.url(), RetryPolicy::default());
        let request = ApiRequest::get("/v1/test")
            .with_header("Client-Id", "other")
            .unwrap()
            .with_header("X-Trace", "abc")
            .unwrap();
        let _: serde_json::Value = client.execute(&request).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_forbidden_fails_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/test")
            .with_status(403)
            .with_body(r#"{"message": "Api-Key is invalid"}"#)
            .expect(1)
            .create_async()
            .await;

        let calls = Arc::new(AtomicU32::new(0));
        let mut clock = MockClock::new();
        clock.expect_now().returning(tokio::time::Instant::now);
        clock.expect_sleep().times(0);
        let config = ClientConfig::new(server.url()).with_retry(counting_policy(5, calls.clone()));
        let client = HttpClient::new(&config, seller_credentials())
            .unwrap()
            .with_clock(Arc::new(clock));

        let result: ApiResult<serde_json::Value> = client.get("/v1/test", &[]).await;

        mock.assert_async().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        match result {
            Err(ApiError::Auth { status, message }) => {
                assert_eq!(status, Some(403));
                assert_eq!(message, "Api-Key is invalid");
            }
            other => panic!("Expected auth error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_error_fails_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/test")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = client_with(server.url(), RetryPolicy::default());
        let result: ApiResult<serde_json::Value> = client.get("/v1/test", &[]).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(ApiError::Client { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_server_error_exhausts_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/test")
            .with_status(503)
            .expect(4)
            .create_async()
            .await;

        let calls = Arc::new(AtomicU32::new(0));
        let client = client_with(server.url(), counting_policy(3, calls.clone()));
        let result: ApiResult<serde_json::Value> = client.get("/v1/test", &[]).await;

        mock.assert_async().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(ApiError::Server {
                status: 503,
                attempts: 4,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/test")
            .with_status(429)
            .with_header("retry-after", "2")
            .with_body(r#"{"message": "Too many requests"}"#)
            .expect(2)
            .create_async()
            .await;

        let client = client_with(server.url(), RetryPolicy::default().with_max_retries(1));
        let result: ApiResult<serde_json::Value> = client.get("/v1/test", &[]).await;

        match result {
            Err(ApiError::RateLimited {
                attempts,
                message,
                retry_after,
            }) => {
                assert_eq!(attempts, 2);
                assert_eq!(message, "Too many requests");
                assert_eq!(retry_after, Some(Duration::from_secs(2)));
            }
            other => panic!("Expected rate limit error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retryable_until_final_attempt_succeeds() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let max_retries = 4;
        let server = MockServer::start().await;
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = hits.clone();
        Mock::given(method("GET"))
            .and(path("/v1/test"))
            .respond_with(move |_req: &wiremock::Request| -> ResponseTemplate {
                let current = hits_clone.fetch_add(1, Ordering::SeqCst);
                if current < max_retries {
                    ResponseTemplate::new(502)
                } else {
                    ResponseTemplate::new(200).set_body_string(r#"{"name": "ok", "value": 1}"#)
                }
            })
            .expect(u64::from(max_retries) + 1)
            .mount(&server)
            .await;

        let calls = Arc::new(AtomicU32::new(0));
        let client = client_with(server.uri(), counting_policy(max_retries, calls.clone()));
        let result: TestResponse = client.get("/v1/test", &[]).await.unwrap();

        assert_eq!(result.name, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), max_retries);
        assert_eq!(hits.load(Ordering::SeqCst), max_retries + 1);
    }

    #[tokio::test]
    async fn test_observer_sees_backoff_and_server_hint() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = hits.clone();
        Mock::given(method("GET"))
            .respond_with(move |_req: &wiremock::Request| -> ResponseTemplate {
                match hits_clone.fetch_add(1, Ordering::SeqCst) {
                    0 => ResponseTemplate::new(429).insert_header("retry-after", "30"),
                    1 => ResponseTemplate::new(500),
                    _ => ResponseTemplate::new(200).set_body_string("{}"),
                }
            })
            .mount(&server)
            .await;

        let seen: Arc<Mutex<Vec<(u32, Duration)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let policy = RetryPolicy::default()
            .with_jitter(false)
            .with_delays(Duration::from_secs(1), Duration::from_secs(60))
            .with_observer(move |attempt: u32, delay: Duration, _: &RetryCause| {
                seen_clone.lock().unwrap().push((attempt, delay));
            });

        let slept: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));
        let slept_clone = slept.clone();
        let mut clock = MockClock::new();
        clock.expect_now().returning(tokio::time::Instant::now);
        clock
            .expect_sleep()
            .returning(move |d| slept_clone.lock().unwrap().push(d));

        let config = ClientConfig::new(server.uri()).with_retry(policy);
        let client = HttpClient::new(&config, seller_credentials())
            .unwrap()
            .with_clock(Arc::new(clock));
        let _: serde_json::Value = client.get("/v1/test", &[]).await.unwrap();

        let expected = vec![(1, Duration::from_secs(30)), (2, Duration::from_secs(2))];
        assert_eq!(*seen.lock().unwrap(), expected);
        assert_eq!(
            *slept.lock().unwrap(),
            vec![Duration::from_secs(30), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_transport_error_is_retried_then_surfaced() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let calls = Arc::new(AtomicU32::new(0));
        let client = client_with(format!("http://{}", addr), counting_policy(2, calls.clone()));
        let result: ApiResult<serde_json::Value> = client.get("/v1/test", &[]).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(result, Err(ApiError::Transport { attempts: 3, .. })));
    }

    #[tokio::test]
    async fn test_invalid_json_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/test")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = client_with(server.url(), RetryPolicy::default());
        let result: ApiResult<TestResponse> = client.get("/v1/test", &[]).await;
        assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_cancelled_client_does_not_send() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/test")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let client = client_with(server.url(), RetryPolicy::default());
        client.close();
        let result: ApiResult<serde_json::Value> = client.get("/v1/test", &[]).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(ApiError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_releases_permit() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/test")
            .with_status(503)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let config = ClientConfig::new(server.url())
            .with_max_concurrent_requests(1)
            .with_retry(
                RetryPolicy::default()
                    .with_jitter(false)
                    .with_delays(Duration::from_secs(3600), Duration::from_secs(3600)),
            );
        let client = Arc::new(
            HttpClient::new(&config, seller_credentials())
                .unwrap()
                .with_cancellation(cancel.clone()),
        );

        let task = {
            let client = client.clone();
            tokio::spawn(async move { client.get::<serde_json::Value>("/v1/test", &[]).await })
        };

        // Let the first attempt complete so the task is parked in backoff.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!task.is_finished());
        assert_eq!(client.limiter().in_flight(), 0);

        cancel.cancel();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(ApiError::Cancelled)));
        assert_eq!(client.limiter().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_permit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/test")
            .expect(0)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let config = ClientConfig::new(server.url()).with_max_concurrent_requests(1);
        let client = Arc::new(
            HttpClient::new(&config, seller_credentials())
                .unwrap()
                .with_clock(Arc::new(instant_clock()))
                .with_cancellation(cancel.clone()),
        );

        let held = client.limiter().acquire().await.unwrap();
        assert_eq!(client.limiter().in_flight(), 1);

        let task = {
            let client = client.clone();
            tokio::spawn(async move { client.get::<serde_json::Value>("/v1/test", &[]).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(ApiError::Cancelled)));
        assert_eq!(client.limiter().in_flight(), 1);

        drop(held);
        assert_eq!(client.limiter().in_flight(), 0);
        mock.assert_async().await;
    }

    #[test]
    fn test_raw_response_helpers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/csv"));
        let response = RawResponse {
            status: StatusCode::OK,
            headers,
            body: b"a;b\n1;2".to_vec(),
        };
        assert_eq!(response.content_type(), Some("text/csv"));
        assert_eq!(response.text().unwrap(), "a;b\n1;2");

        let empty = RawResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
        };
        let value: Option<serde_json::Value> = empty.json().unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_invalid_extra_header_is_validation_error() {
        let result = ApiRequest::get("/").with_header("X-Bad", "line\nbreak");
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }
}
