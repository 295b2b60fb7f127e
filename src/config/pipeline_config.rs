//! Pipeline Configuration - operator-tunable TOML values
//!
//! Every section implements `Default`, so an empty file (or no file) yields a
//! working single-node deployment: spool queue, sled storage, full breakpoint
//! scale, four workers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::aqi::{BreakpointScale, BreakpointSet};
use crate::types::Pollutant;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "AQI_PIPELINE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "aqi_pipeline.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one pipeline process.
///
/// Load with `PipelineConfig::load()` which searches:
/// 1. explicit path (`--config`)
/// 2. `$AQI_PIPELINE_CONFIG`
/// 3. `./aqi_pipeline.toml`
/// 4. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Worker pool and wire format
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Breakpoint scale, version label and per-pollutant table overrides
    #[serde(default)]
    pub breakpoints: BreakpointConfig,

    /// Per-pollutant unit factor, calibration gain and physical envelope,
    /// keyed by pollutant name (`pm2_5`, `pm10`, `o3`, `co`, `no2`)
    #[serde(default)]
    pub pollutants: BTreeMap<String, PollutantOverrides>,

    /// Sink write retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Collaborator call budgets
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Inbound queue selection
    #[serde(default)]
    pub queue: QueueConfig,

    /// Weather observation spool feeding the side table
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Storage backend and data directory
    #[serde(default)]
    pub storage: StorageConfig,

    /// Optional AQI prediction model
    #[serde(default)]
    pub model: ModelConfig,

    /// Optional read API
    #[serde(default)]
    pub server: ServerConfig,
}

impl PipelineConfig {
    /// Load configuration using the standard search order.
    ///
    /// A file that exists but fails to parse or validate is an error: the
    /// breakpoint tables it carries decide every persisted index, so silently
    /// scoring with defaults is not acceptable.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        // 1. --config
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            info!(path = %path.display(), "Loaded pipeline config from --config");
            return Ok(config);
        }

        // 2. env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                let config = Self::load_from_file(&p)?;
                info!(path = %p.display(), "Loaded pipeline config from {}", CONFIG_ENV_VAR);
                return Ok(config);
            }
            warn!(path = %path, "{} points to non-existent file, ignoring", CONFIG_ENV_VAR);
        }

        // 3. ./aqi_pipeline.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            let config = Self::load_from_file(&local)?;
            info!("Loaded pipeline config from ./{}", LOCAL_CONFIG_FILE);
            return Ok(config);
        }

        // 4. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys are logged as warnings.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Build the breakpoint set described by `[breakpoints]`.
    pub fn breakpoint_set(&self) -> Result<BreakpointSet, crate::aqi::BreakpointError> {
        BreakpointSet::from_config(&self.breakpoints)
    }

    /// Resolved settings for one pollutant (overrides applied to defaults).
    pub fn pollutant_settings(&self, pollutant: Pollutant) -> PollutantSettings {
        let base = PollutantSettings::defaults_for(pollutant);
        match self.pollutants.get(pollutant.key()) {
            Some(o) => PollutantSettings {
                unit_factor: o.unit_factor.unwrap_or(base.unit_factor),
                calibration_gain: o.calibration_gain.unwrap_or(base.calibration_gain),
                envelope_min: o.envelope.map_or(base.envelope_min, |e| e[0]),
                envelope_max: o.envelope.map_or(base.envelope_max, |e| e[1]),
            },
            None => base,
        }
    }

    /// Resolved settings for every pollutant.
    pub fn all_pollutant_settings(&self) -> BTreeMap<Pollutant, PollutantSettings> {
        Pollutant::ALL
            .iter()
            .map(|p| (*p, self.pollutant_settings(*p)))
            .collect()
    }

    /// Validate all sections for internal consistency.
    ///
    /// Errors are collected rather than returned on first failure so an
    /// operator sees every problem in one run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        // Pipeline
        if self.pipeline.workers == 0 {
            errors.push("pipeline.workers must be >= 1".to_string());
        }
        if self.pipeline.timestamp_format.trim().is_empty() {
            errors.push("pipeline.timestamp_format must not be empty".to_string());
        } else if !is_valid_strftime(&self.pipeline.timestamp_format) {
            errors.push(format!(
                "pipeline.timestamp_format '{}' is not a valid strftime pattern",
                self.pipeline.timestamp_format
            ));
        }

        // Breakpoints
        if let Err(e) = self.breakpoint_set() {
            errors.push(format!("breakpoints: {e}"));
        }

        // Pollutant overrides
        for (name, o) in &self.pollutants {
            if name.parse::<Pollutant>().is_err() {
                errors.push(format!("pollutants.{name}: unknown pollutant"));
                continue;
            }
            if let Some(f) = o.unit_factor {
                Self::check_positive(f, &format!("pollutants.{name}.unit_factor"), &mut errors);
            }
            if let Some(g) = o.calibration_gain {
                Self::check_positive(g, &format!("pollutants.{name}.calibration_gain"), &mut errors);
            }
            if let Some([lo, hi]) = o.envelope {
                if !lo.is_finite() || !hi.is_finite() {
                    errors.push(format!(
                        "pollutants.{name}.envelope: values must be finite (got [{lo}, {hi}])"
                    ));
                } else if lo < 0.0 || hi <= lo {
                    errors.push(format!(
                        "pollutants.{name}.envelope: expected 0 <= min < max (got [{lo}, {hi}])"
                    ));
                }
            }
        }

        // Retry
        let r = &self.retry;
        if r.max_attempts == 0 {
            errors.push("retry.max_attempts must be >= 1".to_string());
        }
        if r.initial_backoff_ms > r.max_backoff_ms {
            errors.push(format!(
                "retry: initial_backoff_ms ({}) must be <= max_backoff_ms ({})",
                r.initial_backoff_ms, r.max_backoff_ms
            ));
        }
        if !r.multiplier.is_finite() || r.multiplier < 1.0 {
            errors.push(format!("retry.multiplier = {} must be finite and >= 1.0", r.multiplier));
        }

        // Timeouts
        if self.timeouts.weather_lookup_ms == 0 {
            errors.push("timeouts.weather_lookup_ms must be > 0".to_string());
        }
        if self.timeouts.sink_write_ms == 0 {
            errors.push("timeouts.sink_write_ms must be > 0".to_string());
        }

        // Queue
        if self.queue.poll_interval_ms == 0 {
            errors.push("queue.poll_interval_ms must be > 0".to_string());
        }
        if self.weather.poll_interval_ms == 0 {
            errors.push("weather.poll_interval_ms must be > 0".to_string());
        }
        if self.queue.kind == QueueKind::Spool && self.weather.spool_dir == self.queue.spool_dir {
            errors.push(format!(
                "weather.spool_dir and queue.spool_dir must differ (both '{}')",
                self.weather.spool_dir.display()
            ));
        }

        // Server
        if let Some(addr) = &self.server.addr {
            if addr.parse::<std::net::SocketAddr>().is_err() {
                errors.push(format!("server.addr '{addr}' is not a valid socket address"));
            }
        }

        let (range_errors, warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass
        if !value.is_finite() || value <= 0.0 {
            errors.push(format!("{name} = {value} must be finite and > 0"));
        }
    }
}

fn is_valid_strftime(format: &str) -> bool {
    use chrono::format::{Item, StrftimeItems};
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Pipeline Section
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Concurrent workers. Workers share nothing but read-only config and
    /// the (thread-safe) stores.
    pub workers: usize,

    /// strftime layout of `observed_at` in inbound messages.
    pub timestamp_format: String,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            workers: defaults::DEFAULT_WORKERS,
            timestamp_format: defaults::DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

// ============================================================================
// Breakpoints
// ============================================================================

/// `[breakpoints]` section.
///
/// ```toml
/// [breakpoints]
/// scale = "compact"
/// version = "site-2024"
///
/// [breakpoints.tables]
/// co = [[0.0, 4.4, 0, 50], [4.4, 9.4, 51, 100]]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakpointConfig {
    pub scale: BreakpointScale,
    /// Label stored with every persisted row. Defaults to `epa-2012-<scale>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Per-pollutant replacement tables, rows of
    /// `[c_lo, c_hi, i_lo, i_hi]`.
    pub tables: BTreeMap<String, Vec<[f64; 4]>>,
}

// ============================================================================
// Pollutants
// ============================================================================

/// `[pollutants.<name>]` section. Unset keys fall back to built-in values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollutantOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_gain: Option<f64>,
    /// `[min, max]` physical envelope in inbound units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<[f64; 2]>,
}

/// Fully resolved per-pollutant parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollutantSettings {
    /// Inbound units -> breakpoint-table units.
    pub unit_factor: f64,
    pub calibration_gain: f64,
    pub envelope_min: f64,
    pub envelope_max: f64,
}

impl PollutantSettings {
    pub fn defaults_for(pollutant: Pollutant) -> Self {
        let [envelope_min, envelope_max] = match pollutant {
            Pollutant::Pm25 => defaults::PM25_ENVELOPE,
            Pollutant::Pm10 => defaults::PM10_ENVELOPE,
            Pollutant::O3 => defaults::O3_ENVELOPE,
            Pollutant::Co => defaults::CO_ENVELOPE,
            Pollutant::No2 => defaults::NO2_ENVELOPE,
        };
        Self {
            unit_factor: defaults::DEFAULT_UNIT_FACTOR,
            calibration_gain: defaults::DEFAULT_CALIBRATION_GAIN,
            envelope_min,
            envelope_max,
        }
    }

    /// Inclusive envelope check. NaN is never within the envelope.
    pub fn within_envelope(&self, value: f64) -> bool {
        value >= self.envelope_min && value <= self.envelope_max
    }
}

// ============================================================================
// Retry / Timeouts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per sink write, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: defaults::DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: defaults::DEFAULT_MAX_BACKOFF_MS,
            multiplier: defaults::DEFAULT_BACKOFF_MULTIPLIER,
            jitter_ms: defaults::DEFAULT_JITTER_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub weather_lookup_ms: u64,
    /// Per attempt, not per write.
    pub sink_write_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            weather_lookup_ms: defaults::DEFAULT_WEATHER_LOOKUP_TIMEOUT_MS,
            sink_write_ms: defaults::DEFAULT_SINK_WRITE_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// Queue / Storage / Model / Server
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Durable directory spool, polled.
    #[default]
    Spool,
    /// JSON lines on standard input.
    Stdin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub kind: QueueKind,
    pub spool_dir: PathBuf,
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            kind: QueueKind::default(),
            spool_dir: PathBuf::from(defaults::DEFAULT_SPOOL_DIR),
            poll_interval_ms: defaults::DEFAULT_SPOOL_POLL_INTERVAL_MS,
        }
    }
}

/// `[weather]` section: observations dropped into `spool_dir` (one JSON
/// object per file, see `aqi-pipeline import-weather`) are recorded into the
/// side table by the running pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub spool_dir: PathBuf,
    pub poll_interval_ms: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            spool_dir: PathBuf::from(defaults::DEFAULT_WEATHER_SPOOL_DIR),
            poll_interval_ms: defaults::DEFAULT_WEATHER_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sled,
    /// Process-local maps; nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: PathBuf::from(defaults::DEFAULT_DATA_DIR),
        }
    }
}

impl StorageConfig {
    pub fn sled_path(&self) -> PathBuf {
        self.data_dir.join(defaults::SLED_DB_NAME)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// JSON model file. Prediction is disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// HTTP read API. Disabled when `addr` is unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: PipelineConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.pipeline.timestamp_format, "%Y-%m-%d %H:%M:%S");
        assert_eq!(config.breakpoints.scale, BreakpointScale::Full);
        assert_eq!(config.queue.kind, QueueKind::Spool);
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert!(config.server.addr.is_none());
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[pipeline]
workers = 8

[breakpoints]
scale = "compact"

[pollutants.o3]
unit_factor = 0.001
envelope = [0.0, 600.0]
"#;
        let config = PipelineConfig::from_toml_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.pipeline.workers, 8);
        assert_eq!(config.breakpoints.scale, BreakpointScale::Compact);
        let o3 = config.pollutant_settings(Pollutant::O3);
        assert_eq!(o3.unit_factor, 0.001);
        assert_eq!(o3.envelope_max, 600.0);
        assert_eq!(o3.calibration_gain, 1.0);
        // untouched pollutant keeps built-in values
        assert_eq!(config.pollutant_settings(Pollutant::Pm10).envelope_max, 600.0);
    }

    #[test]
    fn test_breakpoint_table_from_toml_integers() {
        let toml_str = r#"
[breakpoints.tables]
co = [[0.0, 10.0, 0, 100]]
"#;
        let config = PipelineConfig::from_toml_str(toml_str).unwrap();
        let set = config.breakpoint_set().unwrap();
        assert_eq!(set.table(Pollutant::Co).unwrap().sub_index(5.0), Some(50.0));
    }

    #[test]
    fn test_validation_catches_gapped_table() {
        let toml_str = r#"
[breakpoints.tables]
pm2_5 = [[0.0, 12.0, 0, 50], [12.1, 35.4, 51, 100]]
"#;
        let err = PipelineConfig::from_toml_str(toml_str).unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert!(errors.iter().any(|e| e.contains("breakpoints")), "{errors:?}");
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_validation_collects_multiple_errors() {
        let mut config = PipelineConfig::default();
        config.pipeline.workers = 0;
        config.retry.max_attempts = 0;
        config.retry.multiplier = f64::NAN;
        config.timeouts.sink_write_ms = 0;
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.len() >= 4, "{errors:?}");
    }

    #[test]
    fn test_validation_rejects_unknown_pollutant_section() {
        let mut config = PipelineConfig::default();
        config
            .pollutants
            .insert("so2".to_string(), PollutantOverrides::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_envelope() {
        let mut config = PipelineConfig::default();
        config.pollutants.insert(
            "pm10".to_string(),
            PollutantOverrides {
                envelope: Some([100.0, 10.0]),
                ..Default::default()
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_timestamp_format() {
        let mut config = PipelineConfig::default();
        config.pipeline.timestamp_format = "%Y-%Q".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_server_addr() {
        let mut config = PipelineConfig::default();
        config.server.addr = Some("not-an-addr".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_weather_spool_must_not_share_reading_spool() {
        let toml_str = r#"
[queue]
spool_dir = "./data/shared"

[weather]
spool_dir = "./data/shared"
"#;
        assert!(matches!(
            PipelineConfig::from_toml_str(toml_str),
            Err(ConfigError::Validation(_))
        ));
        assert_eq!(
            PipelineConfig::default().weather.spool_dir,
            PathBuf::from("./data/weather")
        );
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut original = PipelineConfig::default();
        original.breakpoints.version = Some("v9".to_string());
        let toml_str = original.to_toml().expect("serialization should work");
        let roundtripped: PipelineConfig =
            toml::from_str(&toml_str).expect("deserialization should work");
        assert_eq!(roundtripped.breakpoints, original.breakpoints);
        assert_eq!(roundtripped.retry.max_attempts, original.retry.max_attempts);
    }

    #[test]
    fn test_envelope_is_inclusive_and_rejects_nan() {
        let s = PollutantSettings::defaults_for(Pollutant::Pm25);
        assert!(s.within_envelope(0.0));
        assert!(s.within_envelope(500.0));
        assert!(!s.within_envelope(500.1));
        assert!(!s.within_envelope(-1.0));
        assert!(!s.within_envelope(f64::NAN));
    }

    #[test]
    fn test_load_from_missing_explicit_file_is_error() {
        let err = PipelineConfig::load(Some(Path::new("/nonexistent/aqi.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }
}
