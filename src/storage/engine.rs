//! Local storage engine adapter
//!
//! Wraps a RocksDB instance as a durable ordered map. Keys are namespaced
//! as `collection:key`; the collection part never contains `:`, keys may.
//! Values are opaque bytes. Each call is a single durable operation from
//! the engine's perspective; there is no cross-key atomicity.

use crate::common::{Error, Result};
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::Path;

/// RocksDB-backed key-value engine
pub struct KvEngine {
    db: DB,
}

impl KvEngine {
    /// Open or create the engine under `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    fn make_key(collection: &str, key: &str) -> String {
        format!("{}:{}", collection, key)
    }

    /// Raw write, used by the replication commit path and by the master
    /// after a successful 2PC round.
    pub fn put_direct(&self, collection: &str, key: &str, value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidKey("key cannot be empty".into()));
        }

        let db_key = Self::make_key(collection, key);
        self.db.put(db_key.as_bytes(), value)?;
        Ok(())
    }

    /// Raw delete, symmetric to [`put_direct`](Self::put_direct).
    pub fn delete_direct(&self, collection: &str, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidKey("key cannot be empty".into()));
        }

        let db_key = Self::make_key(collection, key);
        self.db.delete(db_key.as_bytes())?;
        Ok(())
    }

    /// Fetch the raw bytes stored under `collection:key`.
    pub fn get(&self, collection: &str, key: &str) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::InvalidKey("key cannot be empty".into()));
        }

        let db_key = Self::make_key(collection, key);
        match self.db.get(db_key.as_bytes())? {
            Some(value) => Ok(value),
            None => Err(Error::NotFound(key.to_string())),
        }
    }

    /// Delete with an existence check; absent keys fail with `NotFound`.
    pub fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.get(collection, key)?;
        self.delete_direct(collection, key)
    }

    /// All entries of a collection, keys stripped of the namespace prefix.
    pub fn list(&self, collection: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let prefix = format!("{}:", collection);
        let mut result = Vec::new();

        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (db_key, value) = item?;
            if !db_key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8_lossy(&db_key[prefix.len()..]).into_owned();
            result.push((key, value.into_vec()));
        }

        Ok(result)
    }

    /// Number of keys in a collection.
    pub fn count(&self, collection: &str) -> Result<usize> {
        let prefix = format!("{}:", collection);
        let mut count = 0;

        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (db_key, _) = item?;
            if !db_key.starts_with(prefix.as_bytes()) {
                break;
            }
            count += 1;
        }

        Ok(count)
    }

    /// Every collection with at least one key, sorted.
    pub fn list_collections(&self) -> Result<Vec<String>> {
        let mut collections = std::collections::BTreeSet::new();

        for item in self.db.iterator(IteratorMode::Start) {
            let (db_key, _) = item?;
            if let Some(sep) = db_key.iter().position(|&b| b == b':') {
                collections.insert(String::from_utf8_lossy(&db_key[..sep]).into_owned());
            }
        }

        Ok(collections.into_iter().collect())
    }
}
