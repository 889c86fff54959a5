//! Replication participant (runs on every node)
//!
//! Replicas stage operations on Prepare and apply them on Commit; the
//! master runs the same service but only ever answers health checks.
//! Staged operations live in memory only: losing them on restart is
//! equivalent to an implicit abort.

use crate::common::{NodeRole, Result};
use crate::proto::replication_server::{Replication, ReplicationServer};
use crate::proto::{
    AbortRequest, AbortResponse, CommitRequest, CommitResponse, HealthCheckRequest,
    HealthCheckResponse, OperationType, PrepareRequest, PrepareResponse,
};
use crate::storage::KvEngine;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tonic::{Request, Response, Status};

/// Write surface the participant applies committed operations to.
pub trait StorageBackend: Send + Sync {
    fn put_direct(&self, collection: &str, key: &str, value: &[u8]) -> Result<()>;
    fn delete_direct(&self, collection: &str, key: &str) -> Result<()>;
}

impl StorageBackend for KvEngine {
    fn put_direct(&self, collection: &str, key: &str, value: &[u8]) -> Result<()> {
        KvEngine::put_direct(self, collection, key, value)
    }

    fn delete_direct(&self, collection: &str, key: &str) -> Result<()> {
        KvEngine::delete_direct(self, collection, key)
    }
}

/// An operation staged by Prepare, waiting for Commit or Abort.
struct PendingOp {
    operation: OperationType,
    collection: String,
    key: String,
    value: Vec<u8>,
}

#[derive(Default)]
struct ParticipantState {
    pending: HashMap<String, PendingOp>,
    /// Highest sequence number staged so far; prepares at or below it are
    /// rejected as reordered.
    high_seq: u64,
}

/// gRPC service implementing the participant side of 2PC.
pub struct ReplicationService<S> {
    node_id: String,
    role: NodeRole,
    backend: Arc<S>,
    state: Mutex<ParticipantState>,
}

impl<S: StorageBackend> ReplicationService<S> {
    pub fn new(node_id: String, role: NodeRole, backend: Arc<S>) -> Self {
        Self {
            node_id,
            role,
            backend,
            state: Mutex::new(ParticipantState::default()),
        }
    }

    /// Converts this service into a gRPC server instance.
    pub fn into_server(self) -> ReplicationServer<Self>
    where
        S: 'static,
    {
        ReplicationServer::new(self)
    }

    /// Number of staged-but-unresolved transactions.
    pub fn pending_transactions(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Phase 1: validate and stage. Re-delivery of an already staged
    /// transaction id answers ready without staging twice.
    pub fn handle_prepare(&self, req: PrepareRequest) -> PrepareResponse {
        let mut state = self.state.lock().unwrap();

        if state.pending.contains_key(&req.transaction_id) {
            tracing::debug!(txn = %req.transaction_id, "transaction already staged");
            return PrepareResponse { ready: true };
        }

        if req.key.is_empty() {
            tracing::warn!(txn = %req.transaction_id, "prepare refused: empty key");
            return PrepareResponse { ready: false };
        }

        let Ok(operation) = OperationType::try_from(req.operation) else {
            tracing::warn!(txn = %req.transaction_id, op = req.operation, "prepare refused: unknown operation");
            return PrepareResponse { ready: false };
        };

        if req.sequence <= state.high_seq {
            tracing::warn!(
                txn = %req.transaction_id,
                sequence = req.sequence,
                high_seq = state.high_seq,
                "prepare refused: out-of-order sequence"
            );
            return PrepareResponse { ready: false };
        }

        state.high_seq = req.sequence;
        state.pending.insert(
            req.transaction_id.clone(),
            PendingOp {
                operation,
                collection: req.collection,
                key: req.key,
                value: req.value,
            },
        );

        tracing::debug!(txn = %req.transaction_id, sequence = req.sequence, "transaction staged");
        PrepareResponse { ready: true }
    }

    /// Phase 2: apply the staged operation. On an engine failure the entry
    /// stays staged so a retried commit can re-apply it.
    pub fn handle_commit(&self, req: CommitRequest) -> CommitResponse {
        let mut state = self.state.lock().unwrap();

        let Some(op) = state.pending.get(&req.transaction_id) else {
            tracing::warn!(txn = %req.transaction_id, "commit refused: transaction not found");
            return CommitResponse {
                success: false,
                error: "transaction not found".to_string(),
            };
        };

        let result = match op.operation {
            OperationType::Put => self.backend.put_direct(&op.collection, &op.key, &op.value),
            OperationType::Delete => self.backend.delete_direct(&op.collection, &op.key),
        };

        match result {
            Ok(()) => {
                state.pending.remove(&req.transaction_id);
                tracing::debug!(txn = %req.transaction_id, "transaction committed");
                CommitResponse {
                    success: true,
                    error: String::new(),
                }
            }
            Err(e) => {
                tracing::error!(txn = %req.transaction_id, error = %e, "commit apply failed");
                CommitResponse {
                    success: false,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Phase 2: discard the staged operation. Succeeds even for unknown ids.
    pub fn handle_abort(&self, req: AbortRequest) -> AbortResponse {
        let mut state = self.state.lock().unwrap();
        state.pending.remove(&req.transaction_id);
        tracing::debug!(txn = %req.transaction_id, "transaction aborted");
        AbortResponse { success: true }
    }
}

#[tonic::async_trait]
impl<S: StorageBackend + 'static> Replication for ReplicationService<S> {
    async fn prepare(
        &self,
        req: Request<PrepareRequest>,
    ) -> std::result::Result<Response<PrepareResponse>, Status> {
        Ok(Response::new(self.handle_prepare(req.into_inner())))
    }

    async fn commit(
        &self,
        req: Request<CommitRequest>,
    ) -> std::result::Result<Response<CommitResponse>, Status> {
        Ok(Response::new(self.handle_commit(req.into_inner())))
    }

    async fn abort(
        &self,
        req: Request<AbortRequest>,
    ) -> std::result::Result<Response<AbortResponse>, Status> {
        Ok(Response::new(self.handle_abort(req.into_inner())))
    }

    async fn health_check(
        &self,
        _req: Request<HealthCheckRequest>,
    ) -> std::result::Result<Response<HealthCheckResponse>, Status> {
        Ok(Response::new(HealthCheckResponse {
            healthy: true,
            node_id: self.node_id.clone(),
            role: self.role.to_string(),
        }))
    }
}
