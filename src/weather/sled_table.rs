//! Sled-backed weather table
//!
//! Tree `weather`, key `location_id 0x00 observed_at`, value JSON
//! `WeatherObservation`. Shares the database handle with the AQI stores.
//! The async trait methods run on the blocking pool via [`spawn_sled`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

use super::{LookupError, WeatherLookup, WeatherWriter};
use crate::config::defaults::{WEATHER_HISTORY_PER_LOCATION, WEATHER_TREE};
use crate::storage::keys::{location_prefix, location_time_key};
use crate::storage::spawn_sled;
use crate::types::WeatherObservation;

#[derive(Clone)]
pub struct SledWeatherTable {
    tree: sled::Tree,
}

impl SledWeatherTable {
    /// Open the weather tree inside an existing database.
    pub fn new(db: &sled::Db) -> Result<Self, LookupError> {
        Ok(Self {
            tree: db.open_tree(WEATHER_TREE)?,
        })
    }

    /// Open (or create) a database at `path` and use its weather tree.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LookupError> {
        let db = sled::open(path)?;
        Self::new(&db)
    }

    /// Insert or overwrite an observation, pruning the oldest beyond the
    /// per-location history limit.
    pub fn record(&self, observation: &WeatherObservation) -> Result<(), LookupError> {
        let key = location_time_key(&observation.location_id, &observation.observed_at);
        let value = serde_json::to_vec(observation)?;
        self.tree.insert(key, value)?;

        let prefix = location_prefix(&observation.location_id);
        let count = self.tree.scan_prefix(&prefix).count();
        if count > WEATHER_HISTORY_PER_LOCATION {
            let excess: Vec<sled::IVec> = self
                .tree
                .scan_prefix(&prefix)
                .keys()
                .take(count - WEATHER_HISTORY_PER_LOCATION)
                .collect::<Result<_, _>>()?;
            for key in excess {
                self.tree.remove(key)?;
            }
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<(), LookupError> {
        self.tree.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn decode(value: &[u8]) -> Result<WeatherObservation, LookupError> {
        Ok(serde_json::from_slice(value)?)
    }

    fn find_latest(
        &self,
        location_id: &str,
        at: &DateTime<Utc>,
    ) -> Result<Option<WeatherObservation>, LookupError> {
        let prefix = location_prefix(location_id);
        let upper = location_time_key(location_id, at);

        if let Some(item) = self.tree.range(prefix.clone()..=upper).next_back() {
            let (_, value) = item?;
            return Self::decode(&value).map(Some);
        }

        match self.tree.scan_prefix(&prefix).next_back() {
            Some(item) => {
                let (_, value) = item?;
                Self::decode(&value).map(Some)
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl WeatherLookup for SledWeatherTable {
    async fn latest(
        &self,
        location_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherObservation>, LookupError> {
        let table = self.clone();
        let location_id = location_id.to_string();
        spawn_sled(move || table.find_latest(&location_id, &at)).await
    }

    fn backend_name(&self) -> &str {
        "sled"
    }
}

#[async_trait]
impl WeatherWriter for SledWeatherTable {
    async fn insert(&self, observation: WeatherObservation) -> Result<(), LookupError> {
        let table = self.clone();
        spawn_sled(move || table.record(&observation)).await
    }
}
