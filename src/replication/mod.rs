//! Two-Phase Commit replication between the master and its replicas
//!
//! The master owns a [`ReplicationManager`] holding one [`ReplicaClient`]
//! per configured replica. Every node runs a [`ReplicationService`] gRPC
//! server; on replicas it stages and applies operations, on the master it
//! only answers health checks.

pub mod client;
pub mod server;

pub use client::{ReplicaClient, ReplicationManager};
pub use server::{ReplicationService, StorageBackend};
