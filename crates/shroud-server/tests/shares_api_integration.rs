//! End-to-end tests for the share HTTP API against an in-memory store.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};

use shroud_server::store::{RecordStore, Store};
use shroud_server::{router, AppState, EngineSettings, ShareEngine};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

async fn start_test_server() -> SocketAddr {
    start_server_with(EngineSettings {
        public_url: "https://shroud.test".into(),
        ..Default::default()
    })
    .await
}

async fn start_server_with(settings: EngineSettings) -> SocketAddr {
    let store: Arc<dyn RecordStore> = Arc::new(Store::in_memory().unwrap());
    let engine = ShareEngine::new(store, settings);
    let app = router(AppState { engine }, None);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}

async fn create(addr: SocketAddr, content: &str, expires_in: ChronoDuration) -> reqwest::Response {
    client()
        .post(format!("http://{addr}/shares"))
        .json(&json!({
            "content": content,
            "expiresAt": (Utc::now() + expires_in).to_rfc3339(),
        }))
        .send()
        .await
        .unwrap()
}

async fn fetch(addr: SocketAddr, id: &str) -> reqwest::Response {
    client()
        .get(format!("http://{addr}/shares/{id}"))
        .send()
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health() {
    let addr = start_test_server().await;
    let resp = fetch_path(addr, "/health").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

async fn fetch_path(addr: SocketAddr, path: &str) -> reqwest::Response {
    client()
        .get(format!("http://{addr}{path}"))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_and_read_once() {
    let addr = start_test_server().await;

    let resp = create(addr, "hello", ChronoDuration::seconds(60)).await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();

    let id = body["id"].as_str().unwrap().to_owned();
    assert_eq!(id.len(), 48);
    assert!(id.bytes().all(|b| b.is_ascii_alphanumeric()));
    let url = body["url"].as_str().unwrap();
    assert!(url.contains(&id), "url {url} should embed {id}");
    assert!(url.starts_with("https://shroud.test/shares/"));
    assert!(body["expiresAt"].is_string());

    let resp = fetch(addr, &id).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["content"], "hello");
    assert_eq!(body["id"], id.as_str());
    assert!(body["createdAt"].is_string());
    assert!(body["expiresAt"].is_string());

    let resp = fetch(addr, &id).await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_consumed_and_unknown_look_identical() {
    let addr = start_test_server().await;

    let body: Value = create(addr, "once", ChronoDuration::seconds(60))
        .await
        .json()
        .await
        .unwrap();
    let id = body["id"].as_str().unwrap().to_owned();
    assert_eq!(fetch(addr, &id).await.status(), 200);

    let consumed = fetch(addr, &id).await;
    let consumed_status = consumed.status();
    let consumed_body: Value = consumed.json().await.unwrap();

    let unknown = fetch(addr, &"Z".repeat(48)).await;
    let unknown_status = unknown.status();
    let unknown_body: Value = unknown.json().await.unwrap();

    let malformed = fetch(addr, "not-an-id").await;
    let malformed_status = malformed.status();
    let malformed_body: Value = malformed.json().await.unwrap();

    assert_eq!(consumed_status, 404);
    assert_eq!(consumed_status, unknown_status);
    assert_eq!(consumed_status, malformed_status);
    assert_eq!(consumed_body, unknown_body);
    assert_eq!(consumed_body, malformed_body);
}

#[tokio::test]
async fn test_expired_share_is_gone() {
    let addr = start_test_server().await;

    let resp = create(addr, "too late", ChronoDuration::seconds(-5)).await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let id = body["id"].as_str().unwrap().to_owned();

    let resp = fetch(addr, &id).await;
    assert_eq!(resp.status(), 410);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "share has expired");
    assert!(body.get("content").is_none());
}

#[tokio::test]
async fn test_concurrent_reads_deliver_once() {
    let addr = start_test_server().await;
    let body: Value = create(addr, "race", ChronoDuration::seconds(60))
        .await
        .json()
        .await
        .unwrap();
    let id = body["id"].as_str().unwrap().to_owned();

    let (a, b) = tokio::join!(fetch(addr, &id), fetch(addr, &id));
    let mut statuses = vec![a.status().as_u16(), b.status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, vec![200, 404]);
}

#[tokio::test]
async fn test_create_validation() {
    let addr = start_test_server().await;
    let url = format!("http://{addr}/shares");

    // Missing expiresAt.
    let resp = client()
        .post(&url)
        .json(&json!({"content": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Missing content.
    let resp = client()
        .post(&url)
        .json(&json!({"expiresAt": Utc::now().to_rfc3339()}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Not JSON at all.
    let resp = client()
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());

    // Unparseable timestamp.
    let resp = client()
        .post(&url)
        .json(&json!({"content": "x", "expiresAt": "tomorrow"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Beyond the maximum lifetime.
    let resp = create(addr, "x", ChronoDuration::days(3)).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_recent_keeps_five_newest() {
    let addr = start_test_server().await;

    let mut ids = Vec::new();
    for i in 0..7 {
        let body: Value = create(addr, &format!("secret {i}"), ChronoDuration::seconds(60))
            .await
            .json()
            .await
            .unwrap();
        ids.push(body["id"].as_str().unwrap().to_owned());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let resp = fetch_path(addr, "/shares/recent").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let shares = body["shares"].as_array().unwrap();
    assert_eq!(shares.len(), 5);

    let prefixes: Vec<&str> = shares
        .iter()
        .map(|s| s["secretPrefix"].as_str().unwrap())
        .collect();
    let expected: Vec<&str> = ids.iter().rev().take(5).map(|id| &id[..8]).collect();
    assert_eq!(prefixes, expected);

    // Full ids never leak through the ledger.
    let raw = body.to_string();
    assert!(ids.iter().all(|id| !raw.contains(id.as_str())));
}

#[tokio::test]
async fn test_large_secret_within_configured_limit() {
    // Above axum's stock 2 MB body cap.
    let addr = start_server_with(EngineSettings {
        max_content_bytes: 3 * 1024 * 1024,
        ..Default::default()
    })
    .await;

    let big = "s".repeat(5 * 1024 * 1024 / 2);
    let resp = create(addr, &big, ChronoDuration::seconds(60)).await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let id = body["id"].as_str().unwrap().to_owned();

    let body: Value = fetch(addr, &id).await.json().await.unwrap();
    assert_eq!(body["content"].as_str().unwrap().len(), big.len());
}

#[tokio::test]
async fn test_oversized_secret_reports_limit() {
    let addr = start_test_server().await;

    // Control characters escape to six bytes each in JSON.
    let over = "\u{1}".repeat(1_048_577);
    let resp = create(addr, &over, ChronoDuration::seconds(60)).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(
        body["error"].as_str().unwrap().contains("byte limit"),
        "got {body}"
    );
}
