//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Unknown keys only warn.

use std::collections::HashSet;

use crate::types::Pollutant;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

const STATIC_KEYS: &[&str] = &[
    // [pipeline]
    "pipeline",
    "pipeline.workers",
    "pipeline.timestamp_format",
    // [breakpoints]
    "breakpoints",
    "breakpoints.scale",
    "breakpoints.version",
    "breakpoints.tables",
    // [pollutants]
    "pollutants",
    // [retry]
    "retry",
    "retry.max_attempts",
    "retry.initial_backoff_ms",
    "retry.max_backoff_ms",
    "retry.multiplier",
    "retry.jitter_ms",
    // [timeouts]
    "timeouts",
    "timeouts.weather_lookup_ms",
    "timeouts.sink_write_ms",
    // [queue]
    "queue",
    "queue.kind",
    "queue.spool_dir",
    "queue.poll_interval_ms",
    // [weather]
    "weather",
    "weather.spool_dir",
    "weather.poll_interval_ms",
    // [storage]
    "storage",
    "storage.backend",
    "storage.data_dir",
    // [model]
    "model",
    "model.path",
    // [server]
    "server",
    "server.addr",
];

const POLLUTANT_FIELDS: &[&str] = &["unit_factor", "calibration_gain", "envelope"];

/// Returns the complete set of valid dotted key paths for `PipelineConfig`.
///
/// Per-pollutant keys (`pollutants.<p>.*`, `breakpoints.tables.<p>`) are
/// generated from `Pollutant::ALL`. Any new field added to the config
/// structs must be added to `STATIC_KEYS` too.
pub fn known_config_keys() -> HashSet<String> {
    let mut keys: HashSet<String> = STATIC_KEYS.iter().map(|k| (*k).to_string()).collect();
    for p in Pollutant::ALL {
        keys.insert(format!("breakpoints.tables.{}", p.key()));
        keys.insert(format!("pollutants.{}", p.key()));
        for field in POLLUTANT_FIELDS {
            keys.insert(format!("pollutants.{}.{field}", p.key()));
        }
    }
    keys
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let b_len = b_chars.len();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the lexicographically smallest key so suggestions are
/// stable across runs.
pub fn suggest_correction(unknown: &str, known: &HashSet<String>) -> Option<String> {
    known
        .iter()
        .map(|k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.clone())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are reported by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Physical Range Validation
// ============================================================================

/// Validate physical ranges on a parsed `PipelineConfig`.
///
/// Returns (errors, warnings). Errors are impossible values that must
/// prevent startup; warnings are suspicious but not fatal.
pub fn validate_physical_ranges(
    config: &super::PipelineConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // Worker count: beyond this, contention on the stores dominates
    if config.pipeline.workers > 256 {
        errors.push(format!(
            "pipeline.workers = {} exceeds the maximum of 256",
            config.pipeline.workers
        ));
    }

    for p in Pollutant::ALL {
        let Some(o) = config.pollutants.get(p.key()) else {
            continue;
        };

        // Converted units without a matching envelope: most readings would
        // land outside the built-in envelope and be dropped
        if o.unit_factor.is_some_and(|f| (f - 1.0).abs() > f64::EPSILON) && o.envelope.is_none() {
            warnings.push(ValidationWarning {
                field: format!("pollutants.{}.envelope", p.key()),
                message: format!(
                    "pollutants.{}.unit_factor is set but envelope is not; the built-in envelope is in table units",
                    p.key()
                ),
                suggestion: None,
            });
        }

        // Calibration gain: sensors are rarely off by more than 2x
        if let Some(g) = o.calibration_gain {
            if g.is_finite() && !(0.5..=2.0).contains(&g) {
                warnings.push(ValidationWarning {
                    field: format!("pollutants.{}.calibration_gain", p.key()),
                    message: format!(
                        "pollutants.{}.calibration_gain = {g:.3} is outside typical range (0.5-2.0)",
                        p.key()
                    ),
                    suggestion: None,
                });
            }
        }
    }

    // Weather lookup budget longer than a sink write attempt stalls workers
    if config.timeouts.weather_lookup_ms > config.timeouts.sink_write_ms {
        warnings.push(ValidationWarning {
            field: "timeouts.weather_lookup_ms".to_string(),
            message: format!(
                "timeouts.weather_lookup_ms ({}) exceeds timeouts.sink_write_ms ({})",
                config.timeouts.weather_lookup_ms, config.timeouts.sink_write_ms
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, PollutantOverrides};

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("max_atempts", "max_attempts"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [pollutants.pm10]
            envelope = [0.0, 600.0]
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"pollutants".to_string()));
        assert!(keys.contains(&"pollutants.pm10".to_string()));
        assert!(keys.contains(&"pollutants.pm10.envelope".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[retry]
max_atempts = 3
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].field.contains("max_atempts"));
        assert_eq!(warnings[0].suggestion.as_deref(), Some("retry.max_attempts"));
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[pipeline]
workers = 2

[breakpoints]
scale = "full"

[breakpoints.tables]
no2 = [[0.0, 53.0, 0, 50]]

[pollutants.pm2_5]
calibration_gain = 1.1

[server]
addr = "127.0.0.1:8080"
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {:?}", warnings);
    }

    #[test]
    fn test_unknown_pollutant_section_produces_warning() {
        let toml_str = r#"
[pollutants.so2]
unit_factor = 1.0
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.iter().any(|w| w.field == "pollutants.so2"));
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_defaults_produce_no_range_findings() {
        let (errors, warnings) = validate_physical_ranges(&PipelineConfig::default());
        assert!(errors.is_empty(), "{errors:?}");
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_unit_factor_without_envelope_warns() {
        let mut config = PipelineConfig::default();
        config.pollutants.insert(
            "co".to_string(),
            PollutantOverrides {
                unit_factor: Some(0.001),
                ..Default::default()
            },
        );
        let (_, warnings) = validate_physical_ranges(&config);
        assert!(warnings.iter().any(|w| w.field == "pollutants.co.envelope"));
    }

    #[test]
    fn test_too_many_workers_is_error() {
        let mut config = PipelineConfig::default();
        config.pipeline.workers = 10_000;
        let (errors, _) = validate_physical_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("pipeline.workers")));
    }
}
