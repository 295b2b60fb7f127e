//! In-memory stores for testing and minimal deployments
//!
//! Thread-safe via `DashMap`. Not durable; data lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use super::{AnalyticalStore, AppendOutcome, CurrentStore, StorageError};
use crate::types::{AnalyticalRow, CurrentAqiDocument};

#[derive(Debug, Default)]
pub struct MemoryCurrentStore {
    docs: DashMap<String, CurrentAqiDocument>,
}

impl MemoryCurrentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CurrentStore for MemoryCurrentStore {
    async fn upsert(&self, doc: &CurrentAqiDocument) -> Result<(), StorageError> {
        self.docs.insert(doc.location_id.clone(), doc.clone());
        Ok(())
    }

    async fn get(&self, location_id: &str) -> Result<Option<CurrentAqiDocument>, StorageError> {
        Ok(self.docs.get(location_id).map(|d| d.clone()))
    }

    async fn list(&self) -> Result<Vec<CurrentAqiDocument>, StorageError> {
        let mut all: Vec<CurrentAqiDocument> = self.docs.iter().map(|d| d.clone()).collect();
        all.sort_by(|a, b| a.location_id.cmp(&b.location_id));
        Ok(all)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[derive(Debug, Default)]
pub struct MemoryAnalyticalStore {
    rows: DashMap<String, BTreeMap<DateTime<Utc>, AnalyticalRow>>,
}

impl MemoryAnalyticalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnalyticalStore for MemoryAnalyticalStore {
    async fn append_if_absent(&self, row: &AnalyticalRow) -> Result<AppendOutcome, StorageError> {
        // The entry guard holds the shard lock, so check-and-insert is atomic
        let mut history = self.rows.entry(row.location_id.clone()).or_default();
        Ok(match history.entry(row.observed_at) {
            Entry::Occupied(_) => AppendOutcome::Duplicate,
            Entry::Vacant(slot) => {
                slot.insert(row.clone());
                AppendOutcome::Inserted
            }
        })
    }

    async fn history(
        &self,
        location_id: &str,
        limit: usize,
    ) -> Result<Vec<AnalyticalRow>, StorageError> {
        Ok(self
            .rows
            .get(location_id)
            .map(|h| h.values().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn row_count(&self) -> Result<usize, StorageError> {
        Ok(self.rows.iter().map(|h| h.len()).sum())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
