//! Sled-backed AQI stores
//!
//! - tree `current`: key `location_id`, value JSON `CurrentAqiDocument`
//! - tree `analytical`: key `location_id 0x00 observed_at`, value JSON
//!   `AnalyticalRow`
//!
//! Writes are not flushed individually; sled flushes in the background and
//! `Stores::flush` runs at shutdown. A crash can lose the last few writes,
//! which queue redelivery then replays.
//!
//! Every tree access runs through [`spawn_sled`], so callers' timeouts hold.

use async_trait::async_trait;

use super::keys::location_prefix;
use super::{spawn_sled, AnalyticalStore, AppendOutcome, CurrentStore, StorageError};
use crate::config::defaults::{ANALYTICAL_TREE, CURRENT_TREE};
use crate::types::{AnalyticalRow, CurrentAqiDocument};

#[derive(Clone)]
pub struct SledCurrentStore {
    tree: sled::Tree,
}

impl SledCurrentStore {
    pub fn new(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            tree: db.open_tree(CURRENT_TREE)?,
        })
    }
}

#[async_trait]
impl CurrentStore for SledCurrentStore {
    async fn upsert(&self, doc: &CurrentAqiDocument) -> Result<(), StorageError> {
        let key = doc.location_id.clone().into_bytes();
        let value = serde_json::to_vec(doc)?;
        let tree = self.tree.clone();
        spawn_sled::<_, StorageError, _>(move || {
            tree.insert(key, value)?;
            Ok(())
        })
        .await
    }

    async fn get(&self, location_id: &str) -> Result<Option<CurrentAqiDocument>, StorageError> {
        let key = location_id.as_bytes().to_vec();
        let tree = self.tree.clone();
        spawn_sled::<_, StorageError, _>(move || match tree.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        })
        .await
    }

    async fn list(&self) -> Result<Vec<CurrentAqiDocument>, StorageError> {
        let tree = self.tree.clone();
        spawn_sled::<_, StorageError, _>(move || {
            let mut docs = Vec::with_capacity(tree.len());
            for item in tree.iter() {
                let (_, value) = item?;
                docs.push(serde_json::from_slice(&value)?);
            }
            Ok(docs)
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[derive(Clone)]
pub struct SledAnalyticalStore {
    tree: sled::Tree,
}

impl SledAnalyticalStore {
    pub fn new(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            tree: db.open_tree(ANALYTICAL_TREE)?,
        })
    }
}

#[async_trait]
impl AnalyticalStore for SledAnalyticalStore {
    async fn append_if_absent(&self, row: &AnalyticalRow) -> Result<AppendOutcome, StorageError> {
        let key = row.dedup_key().to_bytes();
        let value = serde_json::to_vec(row)?;
        let tree = self.tree.clone();
        spawn_sled::<_, StorageError, _>(move || {
            // CAS from "absent": atomic even with concurrent writers on the same key
            match tree.compare_and_swap(key, None as Option<&[u8]>, Some(value))? {
                Ok(()) => Ok(AppendOutcome::Inserted),
                Err(_) => Ok(AppendOutcome::Duplicate),
            }
        })
        .await
    }

    async fn history(
        &self,
        location_id: &str,
        limit: usize,
    ) -> Result<Vec<AnalyticalRow>, StorageError> {
        let prefix = location_prefix(location_id);
        let tree = self.tree.clone();
        spawn_sled::<_, StorageError, _>(move || {
            let mut rows = Vec::with_capacity(limit.min(64));
            for item in tree.scan_prefix(prefix).rev() {
                if rows.len() >= limit {
                    break;
                }
                let (_, value) = item?;
                rows.push(serde_json::from_slice(&value)?);
            }
            Ok(rows)
        })
        .await
    }

    async fn row_count(&self) -> Result<usize, StorageError> {
        let tree = self.tree.clone();
        spawn_sled::<_, StorageError, _>(move || Ok(tree.len())).await
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stalled_sled_call_does_not_block_timeout() {
        let stalled = spawn_sled(|| -> Result<(), StorageError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        });
        let started = std::time::Instant::now();
        let result = tokio::time::timeout(Duration::from_millis(20), stalled).await;
        assert!(result.is_err(), "timeout must expire while the call is stuck");
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_store_round_trip_through_blocking_pool() {
        let tmp = tempfile::tempdir().unwrap();
        let db = sled::open(tmp.path().join("db")).unwrap();
        let store = SledAnalyticalStore::new(&db).unwrap();
        assert_eq!(store.row_count().await.unwrap(), 0);
        assert!(store.history("a", 5).await.unwrap().is_empty());
    }
}
