//! Node assembly
//!
//! Wires the storage engine, the replication service (every node), the
//! replication manager (master only) and the HTTP API, then serves until
//! one of the servers fails or the process is interrupted.

use crate::api::{create_router, AppState};
use crate::common::{Config, Result};
use crate::replication::{ReplicationManager, ReplicationService};
use crate::storage::{KvEngine, ReplicatedStore};
use std::sync::Arc;

pub struct Node {
    config: Config,
}

impl Node {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting kiwi {} node: {}", crate::VERSION, self.config.node_id);
        tracing::info!("  Role: {}", self.config.role);
        tracing::info!("  HTTP API: {}", self.config.http_addr());
        tracing::info!("  Replication API: {}", self.config.grpc_addr());
        tracing::info!("  DB path: {}", self.config.db_path.display());
        if let Some(master) = &self.config.master_addr {
            tracing::info!("  Master: {}", master);
        }

        // Initialize the storage engine
        let engine = Arc::new(KvEngine::open(&self.config.db_path)?);

        // Master: build the replication client pool
        let manager = if self.config.is_master() && !self.config.replica_addrs.is_empty() {
            tracing::info!("  Replicas: {:?}", self.config.replica_addrs);
            Some(Arc::new(ReplicationManager::new(&self.config.replica_addrs).await))
        } else {
            None
        };

        let store = Arc::new(ReplicatedStore::new(
            engine.clone(),
            self.config.clone(),
            manager,
        ));

        // Replication gRPC server: every node runs it, the master only for
        // health checks
        let grpc_service = ReplicationService::new(
            self.config.node_id.clone(),
            self.config.role,
            engine.clone(),
        );
        let grpc_server = tonic::transport::Server::builder()
            .add_service(grpc_service.into_server())
            .serve(self.config.grpc_addr());

        // HTTP server
        let http_state = AppState {
            store,
            config: Arc::new(self.config.clone()),
        };
        let http_router = create_router(http_state);
        let http_listener = tokio::net::TcpListener::bind(self.config.http_addr()).await?;
        let http_server = axum::serve(http_listener, http_router);

        tracing::info!("✓ Node ready ({})", self.config.role);

        tokio::select! {
            res = http_server => {
                if let Err(e) = res {
                    tracing::error!("HTTP server error: {}", e);
                }
            }
            res = grpc_server => {
                if let Err(e) = res {
                    tracing::error!("gRPC server error: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
            }
        }

        Ok(())
    }
}
