//! HTTP API tests against an in-process server

use kiwi::api::{create_router, AppState};
use kiwi::{Config, KvEngine, NodeRole, ReplicatedStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

async fn spawn_app(role: NodeRole) -> (String, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = Config {
        node_id: "node-1".to_string(),
        role,
        db_path: dir.path().join("db"),
        ..Default::default()
    };

    let engine = Arc::new(KvEngine::open(&config.db_path).unwrap());
    let store = Arc::new(ReplicatedStore::new(engine, config.clone(), None));
    let router = create_router(AppState {
        store,
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}", addr), dir)
}

#[tokio::test]
async fn test_object_crud_flow() {
    let (base, _dir) = spawn_app(NodeRole::Master).await;
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("{base}/objects"))
        .json(&json!({"key": "a", "value": "1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["key"], "a");

    let resp = client.get(format!("{base}/objects/a")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["key"], "a");
    assert_eq!(body["value"], "1");

    let resp = client.get(format!("{base}/objects")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["objects"]["a"], "1");

    let resp = client
        .delete(format!("{base}/objects/a"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.get(format!("{base}/objects/a")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_collection_query_scopes_objects() {
    let (base, _dir) = spawn_app(NodeRole::Master).await;
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("{base}/objects?collection=users"))
        .json(&json!({"key": "user:1", "value": {"name": "Alice"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{base}/objects/user:1?collection=users"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["value"]["name"], "Alice");

    // Absent from the default collection
    let resp = client
        .get(format!("{base}/objects/user:1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_put_validation() {
    let (base, _dir) = spawn_app(NodeRole::Master).await;
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("{base}/objects"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());

    let resp = client
        .put(format!("{base}/objects"))
        .json(&json!({"key": "", "value": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .put(format!("{base}/objects"))
        .json(&json!({"value": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .put(format!("{base}/objects?collection=bad:name"))
        .json(&json!({"key": "k", "value": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_get_missing_returns_not_found() {
    let (base, _dir) = spawn_app(NodeRole::Master).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/objects/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());

    let resp = client
        .delete(format!("{base}/objects/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_write_to_replica_rejected() {
    let (base, _dir) = spawn_app(NodeRole::Replica).await;
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("{base}/objects"))
        .json(&json!({"key": "z", "value": 3}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("not allowed on replica"));

    // No state changed
    let resp = client.get(format!("{base}/objects/z")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_health_and_cluster_status() {
    let (base, _dir) = spawn_app(NodeRole::Master).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["node_id"], "node-1");
    assert_eq!(body["role"], "master");

    let resp = client.get(format!("{base}/cluster")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["role"], "master");
    assert!(body["version"].is_string());
    // Single-node master has no replica pool
    assert!(body.get("replica_count").is_none());
}

#[tokio::test]
async fn test_collections_endpoint() {
    let (base, _dir) = spawn_app(NodeRole::Master).await;
    let client = reqwest::Client::new();

    for (collection, key) in [("users", "u1"), ("users", "u2"), ("orders", "o1")] {
        let resp = client
            .put(format!("{base}/objects?collection={collection}"))
            .json(&json!({"key": key, "value": 1}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let resp = client
        .get(format!("{base}/collections"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["count"], 2);
    let collections = body["collections"].as_array().unwrap();
    assert_eq!(collections[0]["name"], "orders");
    assert_eq!(collections[0]["keys"], 1);
    assert_eq!(collections[1]["name"], "users");
    assert_eq!(collections[1]["keys"], 2);
}
