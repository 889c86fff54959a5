//! Error types for kiwi

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O and storage ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage engine error: {0}")]
    Engine(#[from] rocksdb::Error),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    // === Request validation ===
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("writes not allowed on replica nodes, send request to the master")]
    ReplicaWrite,

    // === Replication (2PC) ===
    #[error("prepare rejected by: {}", .refused.join(", "))]
    PrepareRejected { refused: Vec<String> },

    #[error("replication transport failure: {0}")]
    ReplicationTransport(String),

    #[error("commit partially failed on: {} (replica state may have diverged)", .failed.join(", "))]
    PartialCommit { failed: Vec<String> },

    #[error("local write failed after replication (inconsistency possible): {0}")]
    LocalApply(String),

    // === Serialization ===
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // === Config ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert to an HTTP status code. Writes rejected on a replica map to
    /// 500 like every other replication failure.
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidKey(_) | Error::InvalidArgument(_) | Error::InvalidConfig(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
