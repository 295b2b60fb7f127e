//! AQI Storage
//!
//! Two independent sinks for scored readings:
//! - `CurrentStore`: latest document per location, overwrite on upsert
//! - `AnalyticalStore`: append-only history, deduplicated on
//!   `(location_id, observed_at)` so queue redelivery never duplicates rows
//!
//! Backends:
//! - `sled`: trees `current` / `analytical` / `weather` in one database
//! - `memory`: `dashmap`-backed, for tests and minimal deployments

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};
use crate::types::{AnalyticalRow, CurrentAqiDocument};
use crate::weather::{MemoryWeatherTable, SledWeatherTable, WeatherLookup, WeatherWriter};

pub mod keys;
pub mod lockfile;
mod memory;
mod sled_store;

pub use lockfile::ProcessLock;
pub use memory::{MemoryAnalyticalStore, MemoryCurrentStore};
pub use sled_store::{SledAnalyticalStore, SledCurrentStore};

/// Latest-value store keyed by `location_id`.
#[async_trait]
pub trait CurrentStore: Send + Sync + 'static {
    /// Insert or overwrite the document for `doc.location_id`.
    async fn upsert(&self, doc: &CurrentAqiDocument) -> Result<(), StorageError>;

    async fn get(&self, location_id: &str) -> Result<Option<CurrentAqiDocument>, StorageError>;

    /// Every location's document, ordered by `location_id`.
    async fn list(&self) -> Result<Vec<CurrentAqiDocument>, StorageError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Outcome of an idempotent append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    /// A row with the same dedup key already existed; nothing was written.
    Duplicate,
}

/// Append-only history store.
#[async_trait]
pub trait AnalyticalStore: Send + Sync + 'static {
    /// Insert `row` unless a row with the same `(location_id, observed_at)`
    /// exists. Atomic per key.
    async fn append_if_absent(&self, row: &AnalyticalRow) -> Result<AppendOutcome, StorageError>;

    /// Up to `limit` rows for one location, newest first.
    async fn history(
        &self,
        location_id: &str,
        limit: usize,
    ) -> Result<Vec<AnalyticalRow>, StorageError>;

    /// Total rows across all locations.
    async fn row_count(&self) -> Result<usize, StorageError>;

    fn backend_name(&self) -> &'static str;
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Unavailable(format!("sled task failed: {err}"))
    }
}

impl From<crate::weather::LookupError> for StorageError {
    fn from(err: crate::weather::LookupError) -> Self {
        StorageError::Database(err.to_string())
    }
}

/// Run a synchronous sled operation on the blocking pool.
///
/// Sled calls never yield; awaiting them through `spawn_blocking` keeps the
/// worker's `tokio::time::timeout` able to expire while the I/O is stuck.
pub(crate) async fn spawn_sled<T, E, F>(op: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<tokio::task::JoinError> + Send + 'static,
{
    tokio::task::spawn_blocking(op).await?
}

/// Process-wide store handles, constructed once in `main`.
#[derive(Clone)]
pub struct Stores {
    pub current: Arc<dyn CurrentStore>,
    pub analytical: Arc<dyn AnalyticalStore>,
    pub weather: Arc<dyn WeatherLookup>,
    /// Same table as `weather`, write side.
    pub weather_writer: Arc<dyn WeatherWriter>,
    db: Option<sled::Db>,
}

impl Stores {
    /// All-in-memory stores with an empty weather table.
    pub fn in_memory() -> Self {
        Self::in_memory_with_weather(Arc::new(MemoryWeatherTable::new()))
    }

    /// In-memory stores reading and writing the given weather table.
    pub fn in_memory_with_weather(weather: Arc<MemoryWeatherTable>) -> Self {
        Self {
            current: Arc::new(MemoryCurrentStore::new()),
            analytical: Arc::new(MemoryAnalyticalStore::new()),
            weather: weather.clone(),
            weather_writer: weather,
            db: None,
        }
    }

    /// Every store backed by one sled database.
    pub fn sled(db: sled::Db) -> Result<Self, StorageError> {
        let weather = Arc::new(SledWeatherTable::new(&db)?);
        Ok(Self {
            current: Arc::new(SledCurrentStore::new(&db)?),
            analytical: Arc::new(SledAnalyticalStore::new(&db)?),
            weather: weather.clone(),
            weather_writer: weather,
            db: Some(db),
        })
    }

    /// Open the backend selected by `[storage]`.
    pub fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        match config.backend {
            StorageBackend::Memory => {
                info!("Using in-memory stores (nothing survives restart)");
                Ok(Self::in_memory())
            }
            StorageBackend::Sled => {
                let path = config.sled_path();
                let db = sled::open(&path)?;
                info!(path = %path.display(), "Sled stores opened");
                Self::sled(db)
            }
        }
    }

    /// Flush pending sled writes. No-op for memory stores.
    pub fn flush(&self) -> Result<(), StorageError> {
        if let Some(db) = &self.db {
            db.flush()?;
        }
        Ok(())
    }
}
