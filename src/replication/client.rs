//! Replication coordinator (master side)
//!
//! [`ReplicaClient`] wraps the gRPC client for a single replica;
//! [`ReplicationManager`] drives Two-Phase Commit across all of them in
//! parallel. The protocol requires unanimity: one refused or unreachable
//! replica aborts the whole transaction.

use crate::common::{Error, Result};
use crate::proto::replication_client::ReplicationClient;
use crate::proto::{
    AbortRequest, CommitRequest, HealthCheckRequest, HealthCheckResponse, OperationType,
    PrepareRequest,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tonic::transport::{Channel, Endpoint};

/// Dial timeout for the initial connection to a replica.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline covering every RPC of one transaction.
const TXN_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a single health-check RPC.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Client for one replica. Cloning is cheap; all clones share the same
/// long-lived channel, and a failed call does not tear the channel down.
#[derive(Clone)]
pub struct ReplicaClient {
    addr: String,
    client: ReplicationClient<Channel>,
}

impl ReplicaClient {
    /// Connect to a replica, blocking up to the dial timeout. If the
    /// replica is unreachable the client falls back to a lazy channel so
    /// the address stays in the pool and transport errors surface per call.
    pub async fn connect(addr: String) -> Result<Self> {
        let uri = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.clone()
        } else {
            format!("http://{}", addr)
        };

        let endpoint = Endpoint::from_shared(uri)
            .map_err(|e| Error::InvalidConfig(format!("invalid replica address {addr}: {e}")))?
            .connect_timeout(CONNECT_TIMEOUT);

        let channel = match endpoint.connect().await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(%addr, error = %e, "replica unreachable at startup, deferring connection");
                endpoint.connect_lazy()
            }
        };

        Ok(Self {
            addr,
            client: ReplicationClient::new(channel),
        })
    }

    /// The replica address this client talks to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Phase 1: stage an operation on the replica.
    pub async fn prepare(
        &self,
        txn_id: &str,
        operation: OperationType,
        collection: &str,
        key: &str,
        value: &[u8],
        sequence: u64,
    ) -> Result<bool> {
        let mut client = self.client.clone();
        let response = client
            .prepare(PrepareRequest {
                transaction_id: txn_id.to_string(),
                operation: operation as i32,
                collection: collection.to_string(),
                key: key.to_string(),
                value: value.to_vec(),
                sequence,
            })
            .await
            .map_err(|status| {
                Error::ReplicationTransport(format!("prepare to {} failed: {}", self.addr, status))
            })?;

        Ok(response.into_inner().ready)
    }

    /// Phase 2: apply the staged operation.
    pub async fn commit(&self, txn_id: &str) -> Result<()> {
        let mut client = self.client.clone();
        let response = client
            .commit(CommitRequest {
                transaction_id: txn_id.to_string(),
            })
            .await
            .map_err(|status| {
                Error::ReplicationTransport(format!("commit to {} failed: {}", self.addr, status))
            })?
            .into_inner();

        if !response.success {
            return Err(Error::Internal(format!(
                "commit to {} rejected: {}",
                self.addr, response.error
            )));
        }

        Ok(())
    }

    /// Phase 2: discard the staged operation.
    pub async fn abort(&self, txn_id: &str) -> Result<()> {
        let mut client = self.client.clone();
        client
            .abort(AbortRequest {
                transaction_id: txn_id.to_string(),
            })
            .await
            .map_err(|status| {
                Error::ReplicationTransport(format!("abort to {} failed: {}", self.addr, status))
            })?;

        Ok(())
    }

    pub async fn health_check(&self) -> Result<HealthCheckResponse> {
        let mut client = self.client.clone();
        let response = client
            .health_check(HealthCheckRequest {})
            .await
            .map_err(|status| {
                Error::ReplicationTransport(format!(
                    "health check to {} failed: {}",
                    self.addr, status
                ))
            })?;

        Ok(response.into_inner())
    }
}

/// Drives Two-Phase Commit from the master across all replicas.
///
/// The sequence counter tags transactions in the order `replicate` calls
/// start. Callers that issue writes concurrently will see sequence numbers
/// interleave on the replicas; the store above serializes nothing, so
/// replicas may reject prepares that arrive out of order.
pub struct ReplicationManager {
    clients: Vec<ReplicaClient>,
    seq: Mutex<u64>,
    txn_counter: AtomicU64,
}

impl ReplicationManager {
    /// Build the client pool. Addresses that cannot even be parsed are
    /// dropped with a warning; unreachable replicas stay in the pool and
    /// fail per call.
    pub async fn new(replica_addrs: &[String]) -> Self {
        let mut clients = Vec::new();

        for addr in replica_addrs {
            if addr.is_empty() {
                continue;
            }
            match ReplicaClient::connect(addr.clone()).await {
                Ok(client) => {
                    tracing::info!(%addr, "replica registered");
                    clients.push(client);
                }
                Err(e) => {
                    tracing::warn!(%addr, error = %e, "skipping replica");
                }
            }
        }

        Self {
            clients,
            seq: Mutex::new(0),
            txn_counter: AtomicU64::new(0),
        }
    }

    /// Number of replicas in the pool.
    pub fn participant_count(&self) -> usize {
        self.clients.len()
    }

    fn next_txn_id(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let counter = self.txn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("txn-{}-{}", nanos, counter)
    }

    fn next_seq(&self) -> u64 {
        let mut seq = self.seq.lock().unwrap();
        *seq += 1;
        *seq
    }

    /// Replicate one mutation with Two-Phase Commit.
    ///
    /// With an empty pool this is a no-op. Otherwise: prepare on every
    /// replica in parallel under a single transaction deadline; if all are
    /// ready, commit on every replica, else abort the ones that prepared.
    /// A failed commit phase returns [`Error::PartialCommit`] and the
    /// caller must not apply locally.
    pub async fn replicate(
        &self,
        operation: OperationType,
        collection: &str,
        key: &str,
        value: &[u8],
    ) -> Result<()> {
        if self.clients.is_empty() {
            return Ok(());
        }

        let txn_id = self.next_txn_id();
        let sequence = self.next_seq();
        let deadline = Instant::now() + TXN_TIMEOUT;

        tracing::info!(
            txn = %txn_id,
            op = ?operation,
            collection,
            key,
            sequence,
            replicas = self.clients.len(),
            "starting 2PC transaction"
        );

        // Phase 1: prepare fan-out. Collect every response, no short-circuit.
        let mut tasks = JoinSet::new();
        for client in self.clients.iter().cloned() {
            let txn = txn_id.clone();
            let collection = collection.to_string();
            let key = key.to_string();
            let value = value.to_vec();
            tasks.spawn(async move {
                let outcome = match tokio::time::timeout_at(
                    deadline,
                    client.prepare(&txn, operation, &collection, &key, &value, sequence),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::ReplicationTransport(format!(
                        "prepare to {} timed out",
                        client.addr()
                    ))),
                };
                (client, outcome)
            });
        }

        let mut ready = Vec::new();
        let mut refused = Vec::new();
        let mut transport_errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((client, outcome)) = joined else {
                continue;
            };
            match outcome {
                Ok(true) => {
                    tracing::debug!(txn = %txn_id, addr = client.addr(), "prepare acknowledged");
                    ready.push(client);
                }
                Ok(false) => {
                    tracing::warn!(txn = %txn_id, addr = client.addr(), "prepare refused");
                    refused.push(client.addr().to_string());
                }
                Err(e) => {
                    tracing::warn!(txn = %txn_id, addr = client.addr(), error = %e, "prepare failed");
                    transport_errors.push(e.to_string());
                }
            }
        }

        if ready.len() != self.clients.len() {
            tracing::warn!(txn = %txn_id, "aborting transaction after failed prepare phase");
            self.abort_all(&txn_id, &ready, deadline).await;

            if let Some(first) = transport_errors.into_iter().next() {
                return Err(Error::ReplicationTransport(first));
            }
            return Err(Error::PrepareRejected { refused });
        }

        // Phase 2: commit fan-out under the same deadline.
        let mut tasks = JoinSet::new();
        for client in ready {
            let txn = txn_id.clone();
            tasks.spawn(async move {
                let outcome = match tokio::time::timeout_at(deadline, client.commit(&txn)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::ReplicationTransport(format!(
                        "commit to {} timed out",
                        client.addr()
                    ))),
                };
                (client, outcome)
            });
        }

        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((client, outcome)) = joined else {
                continue;
            };
            match outcome {
                Ok(()) => {
                    tracing::debug!(txn = %txn_id, addr = client.addr(), "commit acknowledged");
                }
                Err(e) => {
                    tracing::error!(txn = %txn_id, addr = client.addr(), error = %e, "commit failed");
                    failed.push(client.addr().to_string());
                }
            }
        }

        if !failed.is_empty() {
            tracing::error!(txn = %txn_id, failed = ?failed, "transaction partially committed");
            return Err(Error::PartialCommit { failed });
        }

        tracing::info!(txn = %txn_id, replicas = self.clients.len(), "transaction committed");
        Ok(())
    }

    /// Send abort to the replicas that answered ready in phase 1.
    async fn abort_all(&self, txn_id: &str, prepared: &[ReplicaClient], deadline: Instant) {
        let mut tasks = JoinSet::new();
        for client in prepared.iter().cloned() {
            let txn = txn_id.to_string();
            tasks.spawn(async move {
                let outcome = match tokio::time::timeout_at(deadline, client.abort(&txn)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::ReplicationTransport(format!(
                        "abort to {} timed out",
                        client.addr()
                    ))),
                };
                (client, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let Ok((client, outcome)) = joined else {
                continue;
            };
            match outcome {
                Ok(()) => {
                    tracing::debug!(txn = %txn_id, addr = client.addr(), "abort acknowledged")
                }
                Err(e) => {
                    tracing::warn!(txn = %txn_id, addr = client.addr(), error = %e, "abort failed")
                }
            }
        }
    }

    /// Health of every replica in the pool, keyed by address.
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let deadline = Instant::now() + HEALTH_TIMEOUT;
        let mut tasks = JoinSet::new();
        for client in self.clients.iter().cloned() {
            tasks.spawn(async move {
                let healthy = matches!(
                    tokio::time::timeout_at(deadline, client.health_check()).await,
                    Ok(Ok(response)) if response.healthy
                );
                (client.addr().to_string(), healthy)
            });
        }

        let mut results = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((addr, healthy)) = joined {
                results.insert(addr, healthy);
            }
        }
        results
    }
}
