//! FlexibeeClient against a mock Flexibee server.

use std::time::Duration;

use flexibee_source::{
    FetchOptions, FlexibeeClient, FlexibeeConfig, Paginator, RetryPolicy, SourceClient,
    SourceError,
};
use serde_json::json;
use sync_core::LogicalType;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{basic_auth, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> FlexibeeClient {
    FlexibeeClient::new(FlexibeeConfig {
        base_url: server.uri(),
        company: "demo".to_string(),
        username: "winstrom".to_string(),
        password: "secret".to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
    .with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
    })
}

fn records_body(slug: &str, ids: &[i64], total: i64) -> serde_json::Value {
    let rows: Vec<_> = ids.iter().map(|id| json!({ "id": id.to_string() })).collect();
    json!({ "winstrom": { "@version": "1.0", "@rowCount": total.to_string(), slug: rows } })
}

#[tokio::test]
async fn test_fetch_page_sends_protocol_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/c/demo/faktura-vydana.json"))
        .and(basic_auth("winstrom", "secret"))
        .and(header("accept", "application/json"))
        .and(query_param("limit", "2"))
        .and(query_param("start", "4"))
        .and(query_param("detail", "full"))
        .and(query_param("add-row-count", "true"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(records_body("faktura-vydana", &[5], 5)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let options = FetchOptions {
        limit: 2,
        start: 4,
        detail: Some("full".to_string()),
        add_row_count: true,
        ..Default::default()
    };
    let page = client(&server)
        .fetch_page("faktura-vydana", &options, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(page.total, Some(5));
    assert_eq!(page.len(), 1);
}

#[tokio::test]
async fn test_filter_is_passed_through() {
    let server = MockServer::start().await;
    let filter = "lastUpdate > '2024-03-01T10:00:00+00:00'";
    Mock::given(method("GET"))
        .and(path("/c/demo/adresar.json"))
        .and(query_param("filter", filter))
        .respond_with(ResponseTemplate::new(200).set_body_json(records_body("adresar", &[], 0)))
        .expect(1)
        .mount(&server)
        .await;

    let options = FetchOptions::default().with_limit(10).with_filter(filter);
    let page = client(&server)
        .fetch_page("adresar", &options, &CancellationToken::new())
        .await
        .unwrap();

    assert!(page.is_empty());
}

#[tokio::test]
async fn test_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/c/demo/adresar.json"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c/demo/adresar.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(records_body("adresar", &[1, 2], 2)))
        .expect(1)
        .mount(&server)
        .await;

    let page = client(&server)
        .fetch_page("adresar", &FetchOptions::default().with_limit(10), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(page.len(), 2);
}

#[tokio::test]
async fn test_gives_up_after_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server)
        .fetch_page("adresar", &FetchOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        SourceError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, SourceError::Server { status: 500, .. }));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .fetch_page("adresar", &FetchOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        SourceError::Http { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad credentials");
        }
        other => panic!("expected Http, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancelled_token_aborts_request() {
    let server = MockServer::start().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client(&server)
        .fetch_page("adresar", &FetchOptions::default(), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_fetch_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/c/demo/adresar/properties.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": { "property": [
                { "propertyName": "id", "type": "integer", "mandatory": "true" },
                { "propertyName": "nazev", "type": "string", "maxLength": "255" },
                { "propertyName": "lastUpdate", "type": "datetime", "isReadOnly": "true" }
            ] }
        })))
        .mount(&server)
        .await;

    let fields = client(&server)
        .fetch_fields("adresar", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(fields.len(), 3);
    assert_eq!(fields[1].name, "nazev");
    assert_eq!(fields[1].max_length, 255);
    assert_eq!(fields[2].logical_type, LogicalType::DateTime);
    assert!(fields[2].read_only);
}

#[tokio::test]
async fn test_paginator_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/c/demo/cenik.json"))
        .and(query_param("limit", "2"))
        .respond_with(|req: &wiremock::Request| {
            let start: i64 = req
                .url
                .query_pairs()
                .find(|(k, _)| k == "start")
                .and_then(|(_, v)| v.parse().ok())
                .unwrap_or(0);
            let ids: Vec<i64> = (start + 1..=(start + 2).min(5)).collect();
            ResponseTemplate::new(200).set_body_json(records_body("cenik", &ids, 5))
        })
        .mount(&server)
        .await;

    let client = client(&server);
    let cancel = CancellationToken::new();
    let mut paginator = Paginator::new(&client, "cenik", FetchOptions::default().with_limit(2));
    let mut sizes = Vec::new();
    while let Some(page) = paginator.next(&cancel).await.unwrap() {
        sizes.push(page.len());
    }

    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(paginator.fetched(), 5);
}
