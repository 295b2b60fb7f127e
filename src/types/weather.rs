//! Weather side-table observation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest meteorological snapshot for a location.
///
/// Written by an independent ingestion flow; the scoring pipeline only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub location_id: String,
    #[serde(with = "super::timefmt")]
    pub observed_at: DateTime<Utc>,
    /// Air temperature (°C)
    pub temperature: f64,
    /// Relative humidity (%)
    pub humidity: f64,
    /// Wind speed (m/s)
    pub wind_speed: f64,
    /// Wind direction (degrees from north)
    pub wind_direction: f64,
}
