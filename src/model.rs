//! Optional AQI prediction model.
//!
//! A linear model over PM2.5, PM10, temperature and humidity, loaded from a
//! JSON file:
//!
//! ```json
//! {"version": 1, "name": "bandung-linear",
//!  "intercept": 3.2,
//!  "weights": {"pm2_5": 2.1, "pm10": 0.4, "temperature": -0.3, "humidity": 0.05}}
//! ```
//!
//! The prediction is stored next to the computed index and never replaces it.
//! A reading missing any feature (no weather, unavailable pollutant) gets no
//! prediction.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ModelConfig;
use crate::types::{EnrichedReading, Pollutant};

/// Supported model file format version.
pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to read model {}: {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("failed to parse model {}: {1}", .0.display())]
    Parse(PathBuf, #[source] serde_json::Error),
    #[error("invalid model: {0}")]
    Invalid(String),
}

/// Input features for one reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelFeatures {
    pub pm2_5: f64,
    pub pm10: f64,
    pub temperature: f64,
    pub humidity: f64,
}

impl ModelFeatures {
    /// `None` when any feature is missing.
    pub fn from_enriched(enriched: &EnrichedReading) -> Option<Self> {
        let weather = enriched.weather.as_ref()?;
        Some(Self {
            pm2_5: enriched.reading.concentration(Pollutant::Pm25)?,
            pm10: enriched.reading.concentration(Pollutant::Pm10)?,
            temperature: weather.temperature,
            humidity: weather.humidity,
        })
    }
}

/// Predicts an AQI value from reading features. Shared read-only by a worker.
pub trait AqiPredictor: Send + Sync {
    fn predict(&self, features: &ModelFeatures) -> f64;
    fn name(&self) -> &str;
}

/// Missing weights are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearWeights {
    pub pm2_5: f64,
    pub pm10: f64,
    pub temperature: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearAqiModel {
    pub version: u32,
    #[serde(default = "default_model_name")]
    pub name: String,
    pub intercept: f64,
    pub weights: LinearWeights,
}

fn default_model_name() -> String {
    "linear".to_string()
}

impl LinearAqiModel {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let data = std::fs::read(path).map_err(|e| ModelError::Io(path.to_path_buf(), e))?;
        let model: Self =
            serde_json::from_slice(&data).map_err(|e| ModelError::Parse(path.to_path_buf(), e))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.version != MODEL_FORMAT_VERSION {
            return Err(ModelError::Invalid(format!(
                "unsupported format version {} (expected {MODEL_FORMAT_VERSION})",
                self.version
            )));
        }
        let w = &self.weights;
        let all_finite = [self.intercept, w.pm2_5, w.pm10, w.temperature, w.humidity]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(ModelError::Invalid("coefficients must be finite".to_string()));
        }
        Ok(())
    }
}

impl AqiPredictor for LinearAqiModel {
    fn predict(&self, f: &ModelFeatures) -> f64 {
        let w = &self.weights;
        let raw = self.intercept
            + w.pm2_5 * f.pm2_5
            + w.pm10 * f.pm10
            + w.temperature * f.temperature
            + w.humidity * f.humidity;
        // AQI is non-negative
        raw.max(0.0)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Load the configured model, if any. Called once per worker.
pub fn load_predictor(config: &ModelConfig) -> Result<Option<Arc<dyn AqiPredictor>>, ModelError> {
    match &config.path {
        Some(path) => Ok(Some(Arc::new(LinearAqiModel::load(path)?))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CleanReading, EnrichmentStatus, WeatherObservation};
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    fn write_model(json: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        f
    }

    fn enriched(with_weather: bool) -> EnrichedReading {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        EnrichedReading {
            reading: CleanReading {
                location_id: "a".to_string(),
                observed_at: at,
                latitude: None,
                longitude: None,
                pollutants: [(Pollutant::Pm25, 40.0), (Pollutant::Pm10, 80.0)].into_iter().collect(),
                unavailable: Vec::new(),
            },
            weather: with_weather.then(|| WeatherObservation {
                location_id: "a".to_string(),
                observed_at: at,
                temperature: 30.0,
                humidity: 70.0,
                wind_speed: 1.0,
                wind_direction: 90.0,
            }),
            enrichment: if with_weather {
                EnrichmentStatus::Matched
            } else {
                EnrichmentStatus::NotFound
            },
        }
    }

    #[test]
    fn test_load_and_predict() {
        let f = write_model(
            r#"{"version":1,"intercept":1.0,
                "weights":{"pm2_5":2.0,"pm10":0.5,"temperature":-1.0,"humidity":0.1}}"#,
        );
        let model = LinearAqiModel::load(f.path()).unwrap();
        assert_eq!(model.name(), "linear");
        let features = ModelFeatures::from_enriched(&enriched(true)).unwrap();
        // 1 + 80 + 40 - 30 + 7
        assert!((model.predict(&features) - 98.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_weather_gives_no_features() {
        assert!(ModelFeatures::from_enriched(&enriched(false)).is_none());
    }

    #[test]
    fn test_bad_model_files_rejected() {
        let f = write_model("{not json");
        assert!(matches!(LinearAqiModel::load(f.path()), Err(ModelError::Parse(..))));

        let f = write_model(r#"{"version":2,"intercept":0,"weights":{}}"#);
        assert!(matches!(LinearAqiModel::load(f.path()), Err(ModelError::Invalid(_))));

        assert!(matches!(
            LinearAqiModel::load(Path::new("/nonexistent/model.json")),
            Err(ModelError::Io(..))
        ));
    }

    #[test]
    fn test_no_path_means_no_predictor() {
        assert!(load_predictor(&ModelConfig::default()).unwrap().is_none());
    }
}
