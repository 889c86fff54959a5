//! Replicated store tests: role gating, single-node mode, and the
//! write-through-2PC path against a live replica

use kiwi::{
    Config, Error, KvEngine, NodeRole, ReplicatedStore, ReplicationManager, ReplicationService,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_stream::wrappers::TcpListenerStream;

fn node_config(role: NodeRole, dir: &TempDir) -> Config {
    Config {
        node_id: "node-1".to_string(),
        role,
        db_path: dir.path().join("db"),
        ..Default::default()
    }
}

fn local_store(role: NodeRole, dir: &TempDir) -> ReplicatedStore {
    let engine = Arc::new(KvEngine::open(dir.path().join("db")).unwrap());
    ReplicatedStore::new(engine, node_config(role, dir), None)
}

#[tokio::test]
async fn test_single_node_put_get_delete() {
    let dir = TempDir::new().unwrap();
    let store = local_store(NodeRole::Master, &dir);

    store.put("default", "a", &json!("1")).await.unwrap();
    assert_eq!(store.get("default", "a").unwrap(), json!("1"));

    store.delete("default", "a").await.unwrap();
    assert!(matches!(store.get("default", "a"), Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_structured_values_roundtrip() {
    let dir = TempDir::new().unwrap();
    let store = local_store(NodeRole::Master, &dir);

    let value = json!({"name": "Alice", "age": 30});
    store.put("users", "user:1", &value).await.unwrap();
    assert_eq!(store.get("users", "user:1").unwrap(), value);
}

#[tokio::test]
async fn test_writes_rejected_on_replica() {
    let dir = TempDir::new().unwrap();
    let store = local_store(NodeRole::Replica, &dir);

    assert!(matches!(
        store.put("default", "z", &json!(3)).await,
        Err(Error::ReplicaWrite)
    ));
    assert!(matches!(
        store.delete("default", "z").await,
        Err(Error::ReplicaWrite)
    ));
    assert!(matches!(store.get("default", "z"), Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_reads_allowed_on_replica() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(KvEngine::open(dir.path().join("db")).unwrap());
    engine
        .put_direct("default", "k", &serde_json::to_vec(&json!(1)).unwrap())
        .unwrap();

    let store = ReplicatedStore::new(engine, node_config(NodeRole::Replica, &dir), None);
    assert_eq!(store.get("default", "k").unwrap(), json!(1));
    assert_eq!(store.count("default").unwrap(), 1);
}

#[tokio::test]
async fn test_delete_missing_key() {
    let dir = TempDir::new().unwrap();
    let store = local_store(NodeRole::Master, &dir);

    assert!(matches!(
        store.delete("default", "missing").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_target_validation() {
    let dir = TempDir::new().unwrap();
    let store = local_store(NodeRole::Master, &dir);

    assert!(matches!(
        store.put("default", "", &json!(1)).await,
        Err(Error::InvalidKey(_))
    ));
    assert!(matches!(
        store.put("bad:name", "k", &json!(1)).await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        store.put("", "k", &json!(1)).await,
        Err(Error::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_list_count_and_collections() {
    let dir = TempDir::new().unwrap();
    let store = local_store(NodeRole::Master, &dir);

    store.put("users", "u1", &json!("a")).await.unwrap();
    store.put("users", "u2", &json!("b")).await.unwrap();
    store.put("orders", "o1", &json!("c")).await.unwrap();

    let users = store.list("users").unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users["u1"], json!("a"));
    assert_eq!(users["u2"], json!("b"));

    assert_eq!(store.count("users").unwrap(), 2);
    assert_eq!(store.count("orders").unwrap(), 1);
    assert_eq!(store.count("empty").unwrap(), 0);
    assert_eq!(
        store.list_collections().unwrap(),
        vec!["orders".to_string(), "users".to_string()]
    );
}

async fn spawn_replica(dir: &TempDir, name: &str) -> (String, Arc<KvEngine>) {
    let engine = Arc::new(KvEngine::open(dir.path().join(name)).unwrap());
    let service = ReplicationService::new(name.to_string(), NodeRole::Replica, engine.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(service.into_server())
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    (addr.to_string(), engine)
}

#[tokio::test]
async fn test_replicated_write_reaches_replica() {
    let dir = TempDir::new().unwrap();
    let (addr, replica_engine) = spawn_replica(&dir, "r1").await;

    let manager = Arc::new(ReplicationManager::new(&[addr]).await);
    let master_engine = Arc::new(KvEngine::open(dir.path().join("master")).unwrap());
    let store = ReplicatedStore::new(
        master_engine.clone(),
        node_config(NodeRole::Master, &dir),
        Some(manager),
    );

    let value = json!({"name": "Alice"});
    store.put("default", "user:1", &value).await.unwrap();

    // Master and replica hold identical bytes
    let expected = serde_json::to_vec(&value).unwrap();
    assert_eq!(master_engine.get("default", "user:1").unwrap(), expected);
    assert_eq!(replica_engine.get("default", "user:1").unwrap(), expected);

    store.delete("default", "user:1").await.unwrap();
    assert!(master_engine.get("default", "user:1").is_err());
    assert!(replica_engine.get("default", "user:1").is_err());
}

#[tokio::test]
async fn test_failed_replication_leaves_master_clean() {
    let dir = TempDir::new().unwrap();

    // Reserve a port, then close the listener so nothing serves it
    let dead_addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let manager = Arc::new(ReplicationManager::new(&[dead_addr]).await);
    let master_engine = Arc::new(KvEngine::open(dir.path().join("master")).unwrap());
    let store = ReplicatedStore::new(
        master_engine.clone(),
        node_config(NodeRole::Master, &dir),
        Some(manager),
    );

    let err = store.put("default", "y", &json!(2)).await.unwrap_err();
    assert!(matches!(err, Error::ReplicationTransport(_)));
    assert!(master_engine.get("default", "y").is_err());
}
