//! Replicated store façade
//!
//! The surface the HTTP layer calls. Reads go straight to the local engine
//! on every node; writes are only accepted on the master and run through
//! Two-Phase Commit across all replicas before the master applies locally.
//!
//! 2PC flow for a mutation:
//! 1. Prepare on every replica; if any refuses, all prepared replicas
//!    abort and nothing is written anywhere.
//! 2. Commit on every replica.
//! 3. The master writes locally only after every replica committed.

use crate::common::{Config, Error, Result};
use crate::proto::OperationType;
use crate::replication::ReplicationManager;
use crate::storage::KvEngine;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct ReplicatedStore {
    engine: Arc<KvEngine>,
    config: Config,
    manager: Option<Arc<ReplicationManager>>,
}

impl ReplicatedStore {
    pub fn new(
        engine: Arc<KvEngine>,
        config: Config,
        manager: Option<Arc<ReplicationManager>>,
    ) -> Self {
        Self {
            engine,
            config,
            manager,
        }
    }

    /// The replication manager, present only on a master with replicas.
    pub fn manager(&self) -> Option<&Arc<ReplicationManager>> {
        self.manager.as_ref()
    }

    fn ensure_master(&self) -> Result<()> {
        if !self.config.is_master() {
            return Err(Error::ReplicaWrite);
        }
        Ok(())
    }

    fn validate_target(collection: &str, key: &str) -> Result<()> {
        if collection.is_empty() {
            return Err(Error::InvalidArgument("collection cannot be empty".into()));
        }
        if collection.contains(':') {
            return Err(Error::InvalidArgument(format!(
                "collection cannot contain ':': {collection}"
            )));
        }
        if key.is_empty() {
            return Err(Error::InvalidKey("key cannot be empty".into()));
        }
        Ok(())
    }

    /// Store a value, replicating it to every replica first.
    ///
    /// On the degenerate single-node deployment the write is purely local.
    /// A local failure after a successful 2PC round is surfaced as
    /// [`Error::LocalApply`]: the replicas hold the new value, the master
    /// does not.
    pub async fn put(&self, collection: &str, key: &str, value: &Value) -> Result<()> {
        self.ensure_master()?;
        Self::validate_target(collection, key)?;

        let data = serde_json::to_vec(value)?;

        let replicated = match &self.manager {
            Some(manager) if manager.participant_count() > 0 => {
                manager
                    .replicate(OperationType::Put, collection, key, &data)
                    .await?;
                true
            }
            _ => false,
        };

        match self.engine.put_direct(collection, key, &data) {
            Ok(()) => Ok(()),
            Err(e) if replicated => Err(Error::LocalApply(e.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Delete a key, replicating the delete to every replica first.
    ///
    /// Existence is checked on the master before 2PC starts; replicas are
    /// not required to fail a delete of a missing key.
    pub async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.ensure_master()?;
        Self::validate_target(collection, key)?;

        self.engine.get(collection, key)?;

        let replicated = match &self.manager {
            Some(manager) if manager.participant_count() > 0 => {
                manager
                    .replicate(OperationType::Delete, collection, key, &[])
                    .await?;
                true
            }
            _ => false,
        };

        match self.engine.delete_direct(collection, key) {
            Ok(()) => Ok(()),
            Err(e) if replicated => Err(Error::LocalApply(e.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Read a value from the local engine. Allowed on every role.
    pub fn get(&self, collection: &str, key: &str) -> Result<Value> {
        let data = self.engine.get(collection, key)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// All entries of a collection. Entries that fail to decode are skipped.
    pub fn list(&self, collection: &str) -> Result<BTreeMap<String, Value>> {
        let mut result = BTreeMap::new();
        for (key, data) in self.engine.list(collection)? {
            if let Ok(value) = serde_json::from_slice(&data) {
                result.insert(key, value);
            }
        }
        Ok(result)
    }

    /// Number of keys in a collection.
    pub fn count(&self, collection: &str) -> Result<usize> {
        self.engine.count(collection)
    }

    /// Every collection with at least one key.
    pub fn list_collections(&self) -> Result<Vec<String>> {
        self.engine.list_collections()
    }
}
