//! # kiwi
//!
//! A small distributed key-value store with a synchronously replicated
//! write path:
//! - a single master accepts mutations over HTTP
//! - mutations are coordinated across all replicas with Two-Phase Commit
//! - the master applies locally only after every replica has committed
//! - gRPC for internal replication, HTTP for the public API
//!
//! ## Architecture
//!
//! ```text
//!            PUT/DELETE (HTTP)
//!                  │
//!            ┌─────▼──────┐
//!            │   Master   │  applies locally after 2PC
//!            └─────┬──────┘
//!                  │ gRPC: Prepare / Commit / Abort
//!        ┌─────────┴──────────┐
//!        │                    │
//!  ┌─────▼──────┐      ┌──────▼─────┐
//!  │ Replica 1  │      │ Replica 2  │   read-only, stage then apply
//!  └────────────┘      └────────────┘
//! ```
//!
//! After any successful write either every node holds the new value or no
//! node does; a failed prepare phase leaves no node changed.
//!
//! ## Usage
//!
//! ```bash
//! # Start a master with two replicas
//! kiwi serve --id master-1 --role master \
//!   --port 3300 --grpc-port 50051 \
//!   --replicas localhost:50052,localhost:50053
//!
//! # Start a replica
//! kiwi serve --id replica-1 --role replica \
//!   --port 3301 --grpc-port 50052 --master-addr localhost:50051
//! ```
//!
//! Every flag is also readable from the environment (`ROLE`, `NODE_ID`,
//! `PORT`, `GRPC_PORT`, `MASTER_ADDR`, `SLAVE_ADDRS`, `DB_PATH`).

pub mod api;
pub mod common;
pub mod replication;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use common::{Config, Error, NodeRole, Result};
pub use replication::{ReplicaClient, ReplicationManager, ReplicationService};
pub use server::Node;
pub use storage::{KvEngine, ReplicatedStore};

// Generated protobuf code
pub mod proto {
    tonic::include_proto!("kiwi");
}

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
