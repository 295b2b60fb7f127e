//! Weather side table
//!
//! Meteorological observations are written by an independent flow (the
//! [`WeatherIngest`] task draining the weather spool, which `import-weather`
//! and upstream collectors fill) and only read by the scoring pipeline.
//! Writes are last-write-wins per `(location_id, observed_at)`; readers never
//! lock or wait for a match.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::WeatherObservation;

mod ingest;
mod memory;
mod sled_table;

pub use ingest::{IngestReport, WeatherIngest};
pub use memory::MemoryWeatherTable;
pub use sled_table::SledWeatherTable;

/// Read side of the weather table, as seen by the enricher.
#[async_trait]
pub trait WeatherLookup: Send + Sync + 'static {
    /// Most recent observation with `observed_at <= at`; when only newer
    /// observations exist, the most recent one overall. `Ok(None)` when the
    /// location has no observations.
    async fn latest(
        &self,
        location_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherObservation>, LookupError>;

    fn backend_name(&self) -> &str;
}

/// Write side of the weather table, used by the ingest task.
#[async_trait]
pub trait WeatherWriter: Send + Sync + 'static {
    /// Insert or overwrite one observation.
    async fn insert(&self, observation: WeatherObservation) -> Result<(), LookupError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("weather backend error: {0}")]
    Backend(String),
    #[error("corrupt weather record: {0}")]
    Decode(String),
}

impl From<sled::Error> for LookupError {
    fn from(err: sled::Error) -> Self {
        LookupError::Backend(err.to_string())
    }
}

impl From<tokio::task::JoinError> for LookupError {
    fn from(err: tokio::task::JoinError) -> Self {
        LookupError::Backend(format!("sled task failed: {err}"))
    }
}

impl From<serde_json::Error> for LookupError {
    fn from(err: serde_json::Error) -> Self {
        LookupError::Decode(err.to_string())
    }
}
