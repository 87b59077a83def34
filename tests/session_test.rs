use async_trait::async_trait;
use chrono::NaiveDate;
use mockito::{Matcher, Server};
use ozon_client::clock::Clock;
use ozon_client::{
    ApiError, ClientConfig, GroupBy, PerformanceClient, PerformanceCredentials, ProgressEvent,
    ReportOptions, ReportRequest, RetryPolicy, SellerClient, SellerCredentials, SessionOptions,
};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Clock that never actually waits.
struct InstantClock;

#[async_trait]
impl Clock for InstantClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, _duration: Duration) {}
}

fn options() -> SessionOptions {
    SessionOptions::default().with_clock(Arc::new(InstantClock))
}

fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();
    for (name, content) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[tokio::test]
async fn test_seller_session_sends_static_headers() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v3/product/list")
        .match_header("client-id", "123456")
        .match_header("api-key", "secret-key")
        .match_header("accept", "application/json")
        .match_body(Matcher::Json(serde_json::json!({"limit": 10})))
        .with_status(200)
        .with_body(r#"{"result": {"items": [{"product_id": 1}], "total": 1}}"#)
        .create_async()
        .await;

    let client = SellerClient::connect_with(
        ClientConfig::new(server.url()),
        SellerCredentials::new("123456", "secret-key"),
        options(),
    )
    .await
    .unwrap();
    let value: serde_json::Value = client
        .post("/v3/product/list", &serde_json::json!({"limit": 10}))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(value["result"]["total"], 1);
}

#[tokio::test]
async fn test_seller_session_surfaces_exhausted_server_errors() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/warehouse/list")
        .with_status(500)
        .with_body(r#"{"code": 13, "message": "internal"}"#)
        .expect(3)
        .create_async()
        .await;

    let config = ClientConfig::new(server.url())
        .with_retry(RetryPolicy::default().with_max_retries(2));
    let client =
        SellerClient::connect_with(config, SellerCredentials::new("1", "k"), options())
            .await
            .unwrap();
    let result: Result<serde_json::Value, ApiError> = client.get("/v1/warehouse/list", &[]).await;

    mock.assert_async().await;
    let err = result.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.attempts(), Some(3));
    assert!(err.to_string().contains("internal"));
}

#[tokio::test]
async fn test_performance_statistics_report_end_to_end() {
    let mut server = Server::new_async().await;
    let token = server
        .mock("POST", "/api/client/token")
        .match_body(Matcher::Json(serde_json::json!({
            "client_id": "perf-id",
            "client_secret": "perf-secret",
            "grant_type": "client_credentials"
        })))
        .with_status(200)
        .with_body(r#"{"access_token": "tok-1", "expires_in": 1800}"#)
        .expect(1)
        .create_async()
        .await;
    let submit = server
        .mock("POST", "/api/client/statistics")
        .match_header("authorization", "Bearer tok-1")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "campaigns": ["123", "456"],
            "groupBy": "DATE"
        })))
        .with_status(200)
        .with_body(r#"{"UUID": "report-1"}"#)
        .expect(1)
        .create_async()
        .await;
    let status = server
        .mock("GET", "/api/client/statistics/report-1")
        .match_header("authorization", "Bearer tok-1")
        .with_status(200)
        .with_body(r#"{"UUID": "report-1", "state": "OK"}"#)
        .expect(1)
        .create_async()
        .await;
    let fetch = server
        .mock("GET", "/api/client/statistics/report")
        .match_query(Matcher::UrlEncoded("UUID".into(), "report-1".into()))
        .with_status(200)
        .with_header("content-type", "application/zip")
        .with_body(zip_bytes(&[
            ("123.csv", "; Campaign 123\nsku;views\n1;10\n"),
            ("456.csv", "; Campaign 456\nsku;views\n2;20\n"),
        ]))
        .expect(1)
        .create_async()
        .await;

    let client = PerformanceClient::connect_with(
        ClientConfig::new(server.url()),
        PerformanceCredentials::new("perf-id", "perf-secret"),
        options(),
    )
    .await
    .unwrap();

    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let observer = move |e: &ProgressEvent| sink.lock().unwrap().push(e.clone());

    let request = ReportRequest::new(
        ["123", "456"],
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    )
    .with_group_by(GroupBy::Date);
    let parts = client
        .statistics_report(
            &request,
            ReportOptions::new(3, Duration::ZERO),
            Some(&observer),
        )
        .await
        .unwrap();

    token.assert_async().await;
    submit.assert_async().await;
    status.assert_async().await;
    fetch.assert_async().await;

    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].item_id, "123");
    assert!(parts[1].content.contains("2;20"));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].job_id, "report-1");
    assert_eq!(events[0].next_poll_in, Some(Duration::ZERO));
}

#[tokio::test]
async fn test_report_with_too_many_campaigns_makes_no_report_calls() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("POST", "/api/client/token")
        .with_status(200)
        .with_body(r#"{"access_token": "tok", "expires_in": 1800}"#)
        .create_async()
        .await;
    let submit = server
        .mock("POST", "/api/client/statistics")
        .expect(0)
        .create_async()
        .await;

    let client = PerformanceClient::connect_with(
        ClientConfig::new(server.url()),
        PerformanceCredentials::new("id", "secret"),
        options(),
    )
    .await
    .unwrap();

    let items: Vec<String> = (1..=11).map(|i| i.to_string()).collect();
    let request = ReportRequest::new(
        items,
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
    );
    let result = client
        .statistics_report(&request, ReportOptions::default(), None)
        .await;

    submit.assert_async().await;
    assert!(matches!(result, Err(ApiError::Validation(_))));
}
