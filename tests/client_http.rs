use httpmock::Method::{DELETE, GET, PATCH, POST, PUT};
use httpmock::MockServer;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vectorify::types::{CollectionObject, ItemObject, QueryObject, UpsertObject};
use vectorify::{
    CancellationToken, Client, Config, Error, FileStore, InMemoryStore, RateLimitState,
    RateLimitStore,
};

const KEY: &str = "api:rate_limit";

fn config(server: &MockServer) -> Config {
    Config::new("test-api-key").with_api_url(server.url("/v1/"))
}

fn client_with(server: &MockServer, store: Arc<InMemoryStore>, attempts: u32) -> Client {
    Client::new(config(server).with_max_attempts(attempts), Some(store)).unwrap()
}

#[tokio::test]
async fn success_sends_auth_headers_and_records_quota() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/test-endpoint")
                .header("api-key", "test-api-key")
                .header("content-type", "application/json")
                .header("accept", "application/json")
                .header_exists("x-request-id");
            then.status(200)
                .header("X-RateLimit-Remaining", "50")
                .body(r#"{"success": true}"#);
        })
        .await;
    let store = Arc::new(InMemoryStore::new());
    let client = client_with(&server, store.clone(), 3);

    let resp = client.get("test-endpoint").await.unwrap().unwrap();
    assert_eq!(resp.status.as_u16(), 200);
    assert_eq!(resp.text(), r#"{"success": true}"#);
    m.assert_async().await;
    assert_eq!(store.get(KEY).await.unwrap().unwrap().remaining, 50);
}

#[tokio::test]
async fn not_found_is_an_explicit_absence() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/missing");
            then.status(404).body("Not Found");
        })
        .await;
    let client = client_with(&server, Arc::new(InMemoryStore::new()), 3);

    let start = Instant::now();
    let resp = client.get("missing").await.unwrap();
    assert!(resp.is_none());
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(m.hits_async().await, 1);
}

#[tokio::test]
async fn bad_request_is_not_retried() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/query");
            then.status(400).body("Bad Request");
        })
        .await;
    let client = client_with(&server, Arc::new(InMemoryStore::new()), 3);

    assert!(client.post("query", Some(b"{}".to_vec())).await.unwrap().is_none());
    assert_eq!(m.hits_async().await, 1);
}

#[tokio::test]
async fn persistent_server_errors_are_exhausted() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/flaky");
            then.status(503).header("X-RateLimit-Remaining", "0");
        })
        .await;
    let store = Arc::new(InMemoryStore::new());
    let client = client_with(&server, store.clone(), 2);

    let start = Instant::now();
    let err = client.get("flaky").await.unwrap_err();
    match err {
        Error::ServerErrorExhausted { status, attempts } => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(m.hits_async().await, 2);
    // 5xx responses carry no trusted quota
    assert!(store.get(KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn rate_limit_with_single_attempt_waits_then_fails() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/limited");
            then.status(429)
                .header("X-RateLimit-Remaining", "0")
                .header("Retry-After", "1")
                .body("Rate limit exceeded");
        })
        .await;
    let store = Arc::new(InMemoryStore::new());
    let client = client_with(&server, store.clone(), 1);

    let start = Instant::now();
    let err = client.get("limited").await.unwrap_err();
    assert!(matches!(err, Error::RateLimitExceeded { attempts: 1 }));
    assert!(start.elapsed() >= Duration::from_millis(900));
    assert_eq!(store.get(KEY).await.unwrap().unwrap().remaining, 0);
}

#[tokio::test]
async fn stored_exhaustion_delays_the_next_call() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/test-endpoint");
            then.status(200).header("X-RateLimit-Remaining", "50");
        })
        .await;
    let store = Arc::new(InMemoryStore::new());
    let seeded = RateLimitState::new(0, chrono::Utc::now() + chrono::Duration::seconds(1));
    store.set(KEY, &seeded, Duration::from_secs(60)).await.unwrap();
    let client = client_with(&server, store.clone(), 3);

    let start = Instant::now();
    assert!(client.get("test-endpoint").await.unwrap().is_some());
    assert!(start.elapsed() >= Duration::from_millis(800));
    assert_eq!(store.get(KEY).await.unwrap().unwrap().remaining, 50);
}

#[tokio::test]
async fn connection_failure_surfaces_transport_error() {
    // nothing listens on port 1
    let cfg = Config::new("k")
        .with_api_url("http://127.0.0.1:1/v1/")
        .with_max_attempts(1);
    let client = Client::new(cfg, None).unwrap();

    let err = client.get("anything").await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn every_verb_goes_through_the_pipeline() {
    let server = MockServer::start_async().await;
    let mut mocks = Vec::new();
    for method in [GET, POST, PUT, PATCH, DELETE] {
        mocks.push(
            server
                .mock_async(|when, then| {
                    when.method(method).path("/v1/things");
                    then.status(200).header("X-RateLimit-Remaining", "50");
                })
                .await,
        );
    }
    let client = client_with(&server, Arc::new(InMemoryStore::new()), 3);

    assert!(client.get("things").await.unwrap().is_some());
    assert!(client.post("things", Some(b"{}".to_vec())).await.unwrap().is_some());
    assert!(client.put("things", Some(b"{}".to_vec())).await.unwrap().is_some());
    assert!(client.patch("things", None).await.unwrap().is_some());
    assert!(client.delete("things").await.unwrap().is_some());
    for m in mocks {
        assert_eq!(m.hits_async().await, 1);
    }
}

#[tokio::test]
async fn cancellation_cuts_a_cooldown_short() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/limited");
            then.status(429).header("Retry-After", "30");
        })
        .await;
    let client = client_with(&server, Arc::new(InMemoryStore::new()), 3);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let err = client
        .request_with_cancel(reqwest::Method::GET, "limited", None, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn clients_sharing_a_state_dir_see_each_others_quota() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/test-endpoint");
            then.status(200).header("X-RateLimit-Remaining", "42");
        })
        .await;
    let dir = tempfile::tempdir().unwrap();
    let first = Client::new(config(&server), Some(Arc::new(FileStore::new(dir.path())))).unwrap();
    first.get("test-endpoint").await.unwrap();

    let other_process_view = FileStore::new(dir.path());
    let state = other_process_view.get(KEY).await.unwrap().unwrap();
    assert_eq!(state.remaining, 42);
}

#[tokio::test]
async fn upsert_reports_acceptance() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/upserts")
                .json_body(serde_json::json!({
                    "collection": {"slug": "products", "metadata": {}},
                    "items": [{"id": "sku-1", "data": {"title": "Boot"}, "metadata": {}, "tenant": null, "url": null}]
                }));
            then.status(201);
        })
        .await;
    let client = client_with(&server, Arc::new(InMemoryStore::new()), 3);
    let mut data = serde_json::Map::new();
    data.insert("title".into(), "Boot".into());
    let object = UpsertObject {
        collection: CollectionObject {
            slug: "products".into(),
            metadata: Default::default(),
        },
        items: vec![ItemObject {
            id: "sku-1".into(),
            data,
            metadata: Default::default(),
            tenant: None,
            url: None,
        }],
    };

    assert!(client.upsert(&object).await.unwrap());
    m.assert_async().await;
}

#[tokio::test]
async fn query_returns_body_only_on_created() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/query")
                .json_body(serde_json::json!({"text": "boots"}));
            then.status(201)
                .json_body(serde_json::json!({"items": [{"id": "sku-1"}]}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/query")
                .json_body(serde_json::json!({"text": "forbidden"}));
            then.status(403);
        })
        .await;
    let client = client_with(&server, Arc::new(InMemoryStore::new()), 3);

    let found = client.query(&QueryObject::new("boots")).await.unwrap().unwrap();
    assert_eq!(found["items"][0]["id"], "sku-1");
    assert!(client.query(&QueryObject::new("forbidden")).await.unwrap().is_none());
}

#[tokio::test]
async fn list_and_fetch_upserts_unwrap_data() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/upserts");
            then.status(200)
                .json_body(serde_json::json!({"data": [{"id": "u1"}, {"id": "u2"}]}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/upserts/u1");
            then.status(200).json_body(serde_json::json!({"data": {"id": "u1"}}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/upserts/gone");
            then.status(404);
        })
        .await;
    let client = client_with(&server, Arc::new(InMemoryStore::new()), 3);

    let all = client.list_upserts().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(client.fetch_upsert("u1").await.unwrap().unwrap()["id"], "u1");
    assert!(client.fetch_upsert("gone").await.unwrap().is_none());
}
