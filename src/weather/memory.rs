//! In-memory weather table (tests, single-process deployments).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;

use super::{LookupError, WeatherLookup, WeatherWriter};
use crate::config::defaults::WEATHER_HISTORY_PER_LOCATION;
use crate::types::WeatherObservation;

#[derive(Debug, Default)]
pub struct MemoryWeatherTable {
    by_location: DashMap<String, BTreeMap<DateTime<Utc>, WeatherObservation>>,
}

impl MemoryWeatherTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an observation.
    pub fn record(&self, observation: WeatherObservation) {
        let mut history = self
            .by_location
            .entry(observation.location_id.clone())
            .or_default();
        history.insert(observation.observed_at, observation);
        while history.len() > WEATHER_HISTORY_PER_LOCATION {
            history.pop_first();
        }
    }

    pub fn location_count(&self) -> usize {
        self.by_location.len()
    }
}

#[async_trait]
impl WeatherLookup for MemoryWeatherTable {
    async fn latest(
        &self,
        location_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherObservation>, LookupError> {
        let Some(history) = self.by_location.get(location_id) else {
            return Ok(None);
        };
        let found = history
            .range(..=at)
            .next_back()
            .or_else(|| history.iter().next_back())
            .map(|(_, o)| o.clone());
        Ok(found)
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl WeatherWriter for MemoryWeatherTable {
    async fn insert(&self, observation: WeatherObservation) -> Result<(), LookupError> {
        self.record(observation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn obs(location: &str, hour: u32, temperature: f64) -> WeatherObservation {
        WeatherObservation {
            location_id: location.to_string(),
            observed_at: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
            temperature,
            humidity: 80.0,
            wind_speed: 2.0,
            wind_direction: 180.0,
        }
    }

    #[tokio::test]
    async fn test_latest_at_or_before() {
        let table = MemoryWeatherTable::new();
        table.record(obs("a", 8, 20.0));
        table.record(obs("a", 10, 23.0));
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let found = table.latest("a", at).await.unwrap().unwrap();
        assert_eq!(found.temperature, 20.0);
    }

    #[tokio::test]
    async fn test_falls_back_to_newest_when_all_later() {
        let table = MemoryWeatherTable::new();
        table.record(obs("a", 8, 20.0));
        table.record(obs("a", 10, 23.0));
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap();
        let found = table.latest("a", at).await.unwrap().unwrap();
        assert_eq!(found.temperature, 23.0);
    }

    #[tokio::test]
    async fn test_unknown_location_is_none() {
        let table = MemoryWeatherTable::new();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap();
        assert!(table.latest("nowhere", at).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins_for_same_time() {
        let table = MemoryWeatherTable::new();
        table.record(obs("a", 8, 20.0));
        table.record(obs("a", 8, 21.5));
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        assert_eq!(table.latest("a", at).await.unwrap().unwrap().temperature, 21.5);
    }
}
