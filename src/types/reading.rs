//! Sensor reading types: SensorReading (decoded), CleanReading (validated)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Pollutant;

// ============================================================================
// Stage 1: Decoded
// ============================================================================

/// A reading as decoded from an inbound message.
///
/// `observed_at` is still the raw string from the payload; the cleaner parses
/// it. Only pollutants actually present in the payload appear in the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub location_id: String,
    pub observed_at: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub pollutants: BTreeMap<Pollutant, f64>,
}

// ============================================================================
// Stage 2: Validated / Cleaned
// ============================================================================

/// A reading that passed validation.
///
/// Produced by the cleaner as a new value; the decoded reading is never
/// mutated. Concentrations are calibrated but still in delivered units (unit
/// conversion to table units happens in the calculator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanReading {
    pub location_id: String,
    #[serde(with = "super::timefmt")]
    pub observed_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// In-envelope, calibrated concentrations.
    pub pollutants: BTreeMap<Pollutant, f64>,
    /// Pollutants that were present but outside their physical envelope.
    #[serde(default)]
    pub unavailable: Vec<Pollutant>,
}

impl CleanReading {
    /// Concentration for a pollutant, if available after cleaning.
    pub fn concentration(&self, pollutant: Pollutant) -> Option<f64> {
        self.pollutants.get(&pollutant).copied()
    }
}
