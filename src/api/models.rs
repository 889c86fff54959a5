//! HTTP request and response bodies

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Body of `PUT /objects`
#[derive(Debug, Serialize, Deserialize)]
pub struct PutRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PutResponse {
    pub message: String,
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub count: usize,
    pub objects: BTreeMap<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub role: String,
}

/// Body of `GET /cluster`; replica fields only appear on the master.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub node_id: String,
    pub role: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_health: Option<HashMap<String, bool>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub keys: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionsResponse {
    pub count: usize,
    pub collections: Vec<CollectionInfo>,
}
