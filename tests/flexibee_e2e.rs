//! Engine pass through the real REST client against a mock Flexibee server.

use std::sync::Arc;
use std::time::Duration;

use checkpoint::CheckpointStore;
use flexibee_source::{FlexibeeClient, FlexibeeConfig, RetryPolicy};
use flexibee_sync::testing::MemoryRecordStore;
use flexibee_sync::{Engine, EngineConfig};
use serde_json::json;
use sync_core::{EntityCatalog, EntityDescriptor};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> Arc<FlexibeeClient> {
    let client = FlexibeeClient::new(FlexibeeConfig {
        base_url: server.uri(),
        company: "demo".to_string(),
        username: "winstrom".to_string(),
        password: "winstrom".to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
    .with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
    });
    Arc::new(client)
}

fn page(ids: &[i64], total: usize) -> serde_json::Value {
    let rows: Vec<_> = ids
        .iter()
        .map(|id| json!({ "id": id.to_string(), "kod": format!("FV{id}"), "sumCelkem": "121.00" }))
        .collect();
    json!({ "winstrom": { "@version": "1.0", "@rowCount": total.to_string(), "faktura-vydana": rows } })
}

#[tokio::test]
async fn test_full_pass_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/c/demo/faktura-vydana.json"))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[3], 3)))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c/demo/faktura-vydana.json"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[1, 2], 3)))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryRecordStore::new());
    let catalog = Arc::new(
        EntityCatalog::new().with(EntityDescriptor::flexibee("faktura-vydana", false)),
    );
    let engine = Engine::new(
        client(&server),
        store.clone(),
        catalog,
        EngineConfig {
            batch_size: 2,
            ..Default::default()
        },
    );

    let summary = engine.run_once(&CancellationToken::new()).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(store.upsert_batches("flexibee_faktura_vydana"), vec![2, 1]);
    let stored = store.row("flexibee_faktura_vydana", 3).unwrap();
    assert_eq!(stored.record.get("kod"), Some(&json!("FV3")));
    let checkpoint = store.read_checkpoint("faktura-vydana").await.unwrap().unwrap();
    assert!(checkpoint.is_ok());
    assert_eq!(checkpoint.row_count, 3);
}

#[tokio::test]
async fn test_transient_errors_are_retried_then_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/c/demo/faktura-vydana.json"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryRecordStore::new());
    let catalog = Arc::new(
        EntityCatalog::new().with(EntityDescriptor::flexibee("faktura-vydana", false)),
    );
    let engine = Engine::new(client(&server), store.clone(), catalog, EngineConfig::default());

    let summary = engine.run_once(&CancellationToken::new()).await;

    assert_eq!(summary.failed, 1);
    let checkpoint = store.read_checkpoint("faktura-vydana").await.unwrap().unwrap();
    assert!(!checkpoint.is_ok());
    assert!(checkpoint.watermark.is_none());
    assert!(checkpoint.error_message.unwrap().contains("3 attempts"));
}
