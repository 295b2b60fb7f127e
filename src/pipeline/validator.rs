//! Validator / Cleaner: `SensorReading` -> `CleanReading`
//!
//! Cleaning policy:
//! - `observed_at` must parse with the configured format (UTC), otherwise the
//!   reading is rejected
//! - `location_id` must not contain control characters (it becomes a storage
//!   key), otherwise the reading is rejected
//! - a pollutant outside its physical envelope is marked unavailable: removed
//!   from the cleaned map and listed in `unavailable`, never zeroed; the
//!   reading is kept
//! - in-envelope values are multiplied by the pollutant's calibration gain
//! - coordinates outside WGS84 ranges are dropped (set to `None`)

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::{PipelineConfig, PollutantSettings};
use crate::types::{timefmt, CleanReading, Pollutant, SensorReading};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("observed_at '{raw}' does not match format '{format}'")]
    InvalidTimestamp { raw: String, format: String },
    #[error("location_id {0:?} contains control characters")]
    InvalidLocation(String),
}

/// Stateless cleaner; cheap to clone and share across workers.
#[derive(Debug, Clone)]
pub struct Cleaner {
    timestamp_format: String,
    settings: BTreeMap<Pollutant, PollutantSettings>,
}

impl Cleaner {
    pub fn new(timestamp_format: impl Into<String>, settings: BTreeMap<Pollutant, PollutantSettings>) -> Self {
        Self {
            timestamp_format: timestamp_format.into(),
            settings,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.pipeline.timestamp_format.clone(),
            config.all_pollutant_settings(),
        )
    }

    fn settings(&self, pollutant: Pollutant) -> PollutantSettings {
        self.settings
            .get(&pollutant)
            .copied()
            .unwrap_or_else(|| PollutantSettings::defaults_for(pollutant))
    }

    /// Produce a new cleaned reading; the input is left untouched.
    pub fn clean(&self, reading: &SensorReading) -> Result<CleanReading, ValidationError> {
        if reading.location_id.chars().any(char::is_control) {
            return Err(ValidationError::InvalidLocation(reading.location_id.clone()));
        }

        let observed_at = self.parse_timestamp(&reading.observed_at)?;

        let mut pollutants = BTreeMap::new();
        let mut unavailable = Vec::new();
        for (&pollutant, &value) in &reading.pollutants {
            let s = self.settings(pollutant);
            if s.within_envelope(value) {
                pollutants.insert(pollutant, value * s.calibration_gain);
            } else {
                debug!(
                    location = %reading.location_id,
                    pollutant = %pollutant,
                    value,
                    min = s.envelope_min,
                    max = s.envelope_max,
                    "Concentration outside physical envelope, marked unavailable"
                );
                unavailable.push(pollutant);
            }
        }

        Ok(CleanReading {
            location_id: reading.location_id.clone(),
            observed_at,
            latitude: reading.latitude.filter(|v| (-90.0..=90.0).contains(v)),
            longitude: reading.longitude.filter(|v| (-180.0..=180.0).contains(v)),
            pollutants,
            unavailable,
        })
    }

    fn parse_timestamp(&self, raw: &str) -> Result<DateTime<Utc>, ValidationError> {
        timefmt::parse_with_format(raw, &self.timestamp_format).ok_or_else(|| {
            ValidationError::InvalidTimestamp {
                raw: raw.to_string(),
                format: self.timestamp_format.clone(),
            }
        })
    }
}
