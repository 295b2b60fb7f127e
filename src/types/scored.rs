//! Enriched / scored readings and the two persisted shapes derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{AqiCategory, AqiResult, CleanReading, Pollutant, WeatherObservation};

// ============================================================================
// Enrichment
// ============================================================================

/// Outcome of the weather side-table join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    /// Observation at or before the reading time.
    Matched,
    /// Only observations newer than the reading exist; the most recent was used.
    Fallback,
    /// No observation for this location yet.
    NotFound,
    /// Side table errored or timed out; weather left unset.
    Degraded,
}

impl EnrichmentStatus {
    pub fn is_degraded(self) -> bool {
        matches!(self, EnrichmentStatus::Degraded)
    }
}

/// Cleaned reading joined with its weather snapshot (if any).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedReading {
    pub reading: CleanReading,
    pub weather: Option<WeatherObservation>,
    pub enrichment: EnrichmentStatus,
}

// ============================================================================
// Scored
// ============================================================================

/// Unit handed to the sink writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredReading {
    pub reading: CleanReading,
    pub weather: Option<WeatherObservation>,
    pub enrichment: EnrichmentStatus,
    pub aqi: AqiResult,
    /// Optional model prediction, stored next to the computed index.
    pub prediction: Option<f64>,
    /// Version label of the breakpoint table that produced `aqi`.
    pub table_version: String,
}

/// Analytical-store dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub location_id: String,
    pub observed_at: DateTime<Utc>,
}

impl DedupKey {
    /// Byte key for ordered stores; see [`crate::storage::keys`].
    pub fn to_bytes(&self) -> Vec<u8> {
        crate::storage::keys::location_time_key(&self.location_id, &self.observed_at)
    }
}

impl ScoredReading {
    pub fn is_degraded(&self) -> bool {
        self.enrichment.is_degraded()
    }

    /// Document for the current-value store.
    ///
    /// Derived purely from the reading (no wall-clock fields), so writing the
    /// same reading twice leaves the stored value unchanged.
    pub fn to_current_document(&self) -> CurrentAqiDocument {
        let w = self.weather.as_ref();
        CurrentAqiDocument {
            location_id: self.reading.location_id.clone(),
            observed_at: self.reading.observed_at,
            latitude: self.reading.latitude,
            longitude: self.reading.longitude,
            overall_index: self.aqi.overall_index,
            category: self.aqi.category,
            dominant_pollutant: self.aqi.dominant_pollutant,
            sub_indices: self.aqi.sub_indices.clone(),
            pollutants: self.reading.pollutants.clone(),
            temperature: w.map(|o| o.temperature),
            humidity: w.map(|o| o.humidity),
            wind_speed: w.map(|o| o.wind_speed),
            wind_direction: w.map(|o| o.wind_direction),
            aqi_prediction: self.prediction,
            degraded: self.is_degraded(),
            table_version: self.table_version.clone(),
        }
    }

    /// Row for the append-only analytical store.
    pub fn to_analytical_row(&self) -> AnalyticalRow {
        let w = self.weather.as_ref();
        let r = &self.reading;
        AnalyticalRow {
            location_id: r.location_id.clone(),
            observed_at: r.observed_at,
            pm2_5: r.concentration(Pollutant::Pm25),
            pm10: r.concentration(Pollutant::Pm10),
            o3: r.concentration(Pollutant::O3),
            co: r.concentration(Pollutant::Co),
            no2: r.concentration(Pollutant::No2),
            temperature: w.map(|o| o.temperature),
            humidity: w.map(|o| o.humidity),
            wind_speed: w.map(|o| o.wind_speed),
            wind_direction: w.map(|o| o.wind_direction),
            overall_index: self.aqi.overall_index,
            category: self.aqi.category,
            dominant_pollutant: self.aqi.dominant_pollutant,
            aqi_prediction: self.prediction,
            degraded: self.is_degraded(),
            table_version: self.table_version.clone(),
        }
    }
}

// ============================================================================
// Persisted shapes
// ============================================================================

/// Latest AQI for one location (current store value, keyed by `location_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentAqiDocument {
    pub location_id: String,
    #[serde(with = "super::timefmt")]
    pub observed_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub overall_index: u32,
    pub category: AqiCategory,
    pub dominant_pollutant: Pollutant,
    pub sub_indices: BTreeMap<Pollutant, Option<f64>>,
    pub pollutants: BTreeMap<Pollutant, f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub aqi_prediction: Option<f64>,
    pub degraded: bool,
    pub table_version: String,
}

/// One historical row (analytical store value, deduplicated on
/// `(location_id, observed_at)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticalRow {
    pub location_id: String,
    #[serde(with = "super::timefmt")]
    pub observed_at: DateTime<Utc>,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub co: Option<f64>,
    pub no2: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub overall_index: u32,
    pub category: AqiCategory,
    pub dominant_pollutant: Pollutant,
    pub aqi_prediction: Option<f64>,
    pub degraded: bool,
    pub table_version: String,
}

impl AnalyticalRow {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            location_id: self.location_id.clone(),
            observed_at: self.observed_at,
        }
    }
}
