//! Breakpoint tables: per-pollutant piecewise-linear calibration data
//!
//! A table is an ordered list of brackets `(c_lo, c_hi, i_lo, i_hi)` mapping a
//! concentration range onto an index range. Tables are configuration: the
//! built-in presets are only the starting point and any pollutant's table may
//! be replaced from TOML.
//!
//! ## Invariants (checked at startup, violations are fatal)
//!
//! - at least one bracket, all values finite and non-negative
//! - `c_hi > c_lo` and `i_hi >= i_lo` within a bracket
//! - sorted ascending by `c_lo`
//! - contiguous: `c_hi[i] == c_lo[i + 1]`
//! - index ranges never step backwards between brackets
//!
//! ## Presets
//!
//! ```text
//! full     six bands, index 0-500 (Good .. Hazardous)
//! compact  five bands, index 0-300 (Good .. Very Unhealthy)
//! ```
//!
//! Units: PM2.5/PM10 µg/m³, O3/CO ppm, NO2 ppb. Inbound values in other units
//! are converted by the per-pollutant `unit_factor`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::defaults::{BRACKET_CONTIGUITY_EPSILON, DEFAULT_TABLE_VERSION};
use crate::config::BreakpointConfig;
use crate::types::Pollutant;

// ============================================================================
// Preset data
// ============================================================================

const FULL_PM25: [[f64; 4]; 6] = [
    [0.0, 12.0, 0.0, 50.0],
    [12.0, 35.4, 51.0, 100.0],
    [35.4, 55.4, 101.0, 150.0],
    [55.4, 150.4, 151.0, 200.0],
    [150.4, 250.4, 201.0, 300.0],
    [250.4, 500.4, 301.0, 500.0],
];

const FULL_PM10: [[f64; 4]; 6] = [
    [0.0, 54.0, 0.0, 50.0],
    [54.0, 154.0, 51.0, 100.0],
    [154.0, 254.0, 101.0, 150.0],
    [254.0, 354.0, 151.0, 200.0],
    [354.0, 424.0, 201.0, 300.0],
    [424.0, 604.0, 301.0, 500.0],
];

const FULL_O3: [[f64; 4]; 6] = [
    [0.0, 0.054, 0.0, 50.0],
    [0.054, 0.070, 51.0, 100.0],
    [0.070, 0.085, 101.0, 150.0],
    [0.085, 0.105, 151.0, 200.0],
    [0.105, 0.200, 201.0, 300.0],
    [0.200, 0.404, 301.0, 500.0],
];

const FULL_CO: [[f64; 4]; 6] = [
    [0.0, 4.4, 0.0, 50.0],
    [4.4, 9.4, 51.0, 100.0],
    [9.4, 12.4, 101.0, 150.0],
    [12.4, 15.4, 151.0, 200.0],
    [15.4, 30.4, 201.0, 300.0],
    [30.4, 50.4, 301.0, 500.0],
];

const FULL_NO2: [[f64; 4]; 6] = [
    [0.0, 53.0, 0.0, 50.0],
    [53.0, 100.0, 51.0, 100.0],
    [100.0, 360.0, 101.0, 150.0],
    [360.0, 649.0, 151.0, 200.0],
    [649.0, 1249.0, 201.0, 300.0],
    [1249.0, 2049.0, 301.0, 500.0],
];

/// Built-in scale choice. Which scale is authoritative is a deployment decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakpointScale {
    /// Six bands up to index 500.
    #[default]
    Full,
    /// Five bands up to index 300; concentrations above the fifth band are
    /// out of table (undefined sub-index).
    Compact,
}

impl BreakpointScale {
    /// Raw preset rows for a pollutant.
    pub fn preset_rows(self, pollutant: Pollutant) -> &'static [[f64; 4]] {
        let full: &'static [[f64; 4]] = match pollutant {
            Pollutant::Pm25 => &FULL_PM25,
            Pollutant::Pm10 => &FULL_PM10,
            Pollutant::O3 => &FULL_O3,
            Pollutant::Co => &FULL_CO,
            Pollutant::No2 => &FULL_NO2,
        };
        match self {
            BreakpointScale::Full => full,
            BreakpointScale::Compact => &full[..5],
        }
    }
}

impl std::fmt::Display for BreakpointScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakpointScale::Full => write!(f, "full"),
            BreakpointScale::Compact => write!(f, "compact"),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Invalid breakpoint configuration. Always fatal at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BreakpointError {
    #[error("{0}: breakpoint table is empty")]
    Empty(Pollutant),
    #[error("{pollutant} bracket #{index}: {reason}")]
    InvalidBracket {
        pollutant: Pollutant,
        index: usize,
        reason: String,
    },
    #[error("{pollutant} bracket #{index}: not sorted ascending by concentration_low")]
    NotSorted { pollutant: Pollutant, index: usize },
    #[error(
        "{pollutant} bracket #{index}: concentration_low {found} does not continue previous concentration_high {expected}"
    )]
    Gap {
        pollutant: Pollutant,
        index: usize,
        expected: f64,
        found: f64,
    },
    #[error("{pollutant} bracket #{index}: index range steps backwards")]
    IndexRegression { pollutant: Pollutant, index: usize },
    #[error("breakpoint table configured for unknown pollutant '{0}'")]
    UnknownPollutant(String),
}

// ============================================================================
// Bracket / Table
// ============================================================================

/// One piecewise-linear segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub c_lo: f64,
    pub c_hi: f64,
    pub i_lo: f64,
    pub i_hi: f64,
}

impl Bracket {
    pub fn from_row(row: [f64; 4]) -> Self {
        Self {
            c_lo: row[0],
            c_hi: row[1],
            i_lo: row[2],
            i_hi: row[3],
        }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, c: f64) -> bool {
        self.c_lo <= c && c <= self.c_hi
    }

    /// `(i_hi - i_lo) / (c_hi - c_lo) * (c - c_lo) + i_lo`
    pub fn interpolate(&self, c: f64) -> f64 {
        (self.i_hi - self.i_lo) / (self.c_hi - self.c_lo) * (c - self.c_lo) + self.i_lo
    }

    fn check(&self) -> Result<(), String> {
        let values = [self.c_lo, self.c_hi, self.i_lo, self.i_hi];
        if values.iter().any(|v| !v.is_finite()) {
            return Err("values must be finite".to_string());
        }
        if values.iter().any(|v| *v < 0.0) {
            return Err("values must be non-negative".to_string());
        }
        if self.c_hi <= self.c_lo {
            return Err(format!(
                "concentration_high ({}) must be > concentration_low ({})",
                self.c_hi, self.c_lo
            ));
        }
        if self.i_hi < self.i_lo {
            return Err(format!(
                "index_high ({}) must be >= index_low ({})",
                self.i_hi, self.i_lo
            ));
        }
        Ok(())
    }
}

/// Validated table for one pollutant.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointTable {
    pollutant: Pollutant,
    brackets: Vec<Bracket>,
}

impl BreakpointTable {
    /// Build a table, enforcing every invariant listed in the module docs.
    pub fn new(pollutant: Pollutant, brackets: Vec<Bracket>) -> Result<Self, BreakpointError> {
        if brackets.is_empty() {
            return Err(BreakpointError::Empty(pollutant));
        }

        for (index, bracket) in brackets.iter().enumerate() {
            bracket
                .check()
                .map_err(|reason| BreakpointError::InvalidBracket {
                    pollutant,
                    index,
                    reason,
                })?;
        }

        for (index, pair) in brackets.windows(2).enumerate() {
            let (prev, next) = (pair[0], pair[1]);
            let index = index + 1;
            if next.c_lo <= prev.c_lo {
                return Err(BreakpointError::NotSorted { pollutant, index });
            }
            if (next.c_lo - prev.c_hi).abs() > BRACKET_CONTIGUITY_EPSILON {
                return Err(BreakpointError::Gap {
                    pollutant,
                    index,
                    expected: prev.c_hi,
                    found: next.c_lo,
                });
            }
            if next.i_lo < prev.i_hi {
                return Err(BreakpointError::IndexRegression { pollutant, index });
            }
        }

        Ok(Self {
            pollutant,
            brackets,
        })
    }

    pub fn from_rows(pollutant: Pollutant, rows: &[[f64; 4]]) -> Result<Self, BreakpointError> {
        Self::new(pollutant, rows.iter().copied().map(Bracket::from_row).collect())
    }

    pub fn pollutant(&self) -> Pollutant {
        self.pollutant
    }

    pub fn brackets(&self) -> &[Bracket] {
        &self.brackets
    }

    /// Highest concentration covered by the table.
    pub fn max_concentration(&self) -> f64 {
        self.brackets.last().map_or(0.0, |b| b.c_hi)
    }

    /// Sub-index for a concentration already in table units.
    ///
    /// The first bracket containing `c` wins, so a shared boundary belongs to
    /// the lower bracket. Returns `None` for NaN, negative values and values
    /// above the table.
    pub fn sub_index(&self, c: f64) -> Option<f64> {
        self.brackets
            .iter()
            .find(|b| b.contains(c))
            .map(|b| b.interpolate(c))
    }
}

// ============================================================================
// Breakpoint Set (all pollutants)
// ============================================================================

/// The canonical, versioned set of tables shared read-only by every worker.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointSet {
    version: String,
    scale: BreakpointScale,
    tables: BTreeMap<Pollutant, BreakpointTable>,
}

impl BreakpointSet {
    /// Build from configuration: preset for the chosen scale, with any
    /// per-pollutant overrides from `[breakpoints.tables]` replacing it.
    pub fn from_config(config: &BreakpointConfig) -> Result<Self, BreakpointError> {
        let mut overrides: BTreeMap<Pollutant, &Vec<[f64; 4]>> = BTreeMap::new();
        for (name, rows) in &config.tables {
            let pollutant = name
                .parse::<Pollutant>()
                .map_err(|_| BreakpointError::UnknownPollutant(name.clone()))?;
            overrides.insert(pollutant, rows);
        }

        let mut tables = BTreeMap::new();
        for pollutant in Pollutant::ALL {
            let table = match overrides.get(&pollutant) {
                Some(rows) => BreakpointTable::from_rows(pollutant, rows)?,
                None => BreakpointTable::from_rows(pollutant, config.scale.preset_rows(pollutant))?,
            };
            tables.insert(pollutant, table);
        }

        let version = config
            .version
            .clone()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| format!("{}-{}", DEFAULT_TABLE_VERSION, config.scale));

        Ok(Self {
            version,
            scale: config.scale,
            tables,
        })
    }

    /// Preset set for a scale with no overrides.
    pub fn preset(scale: BreakpointScale) -> Result<Self, BreakpointError> {
        Self::from_config(&BreakpointConfig {
            scale,
            ..BreakpointConfig::default()
        })
    }

    pub fn table(&self, pollutant: Pollutant) -> Option<&BreakpointTable> {
        self.tables.get(&pollutant)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn scale(&self) -> BreakpointScale {
        self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pm25() -> BreakpointTable {
        BreakpointTable::from_rows(Pollutant::Pm25, &FULL_PM25).unwrap()
    }

    #[test]
    fn test_presets_validate() {
        for scale in [BreakpointScale::Full, BreakpointScale::Compact] {
            let set = BreakpointSet::preset(scale).unwrap();
            for p in Pollutant::ALL {
                assert!(set.table(p).is_some(), "{scale} missing {p}");
            }
        }
    }

    #[test]
    fn test_compact_scale_tops_out_at_300() {
        let set = BreakpointSet::preset(BreakpointScale::Compact).unwrap();
        let table = set.table(Pollutant::Pm25).unwrap();
        assert_eq!(table.brackets().len(), 5);
        assert_eq!(table.max_concentration(), 250.4);
        assert_eq!(table.sub_index(250.4), Some(300.0));
        assert_eq!(table.sub_index(300.0), None);
    }

    #[test]
    fn test_boundary_belongs_to_lower_bracket() {
        let t = pm25();
        assert_eq!(t.sub_index(12.0), Some(50.0));
        assert_eq!(t.sub_index(35.4), Some(100.0));
    }

    #[test]
    fn test_interpolation_just_above_boundary() {
        let t = pm25();
        let v = t.sub_index(12.1).unwrap();
        // 51 + 49 / 23.4 * 0.1
        assert!((v - 51.209_401_709).abs() < 1e-6, "got {v}");
        assert!(v > 51.0);
    }

    #[test]
    fn test_monotonic_within_bracket() {
        let t = pm25();
        let mut prev = t.sub_index(35.5).unwrap();
        let mut c = 35.5;
        while c <= 55.4 {
            let v = t.sub_index(c).unwrap();
            assert!(v >= prev);
            prev = v;
            c += 0.1;
        }
    }

    #[test]
    fn test_out_of_table_is_undefined() {
        let t = pm25();
        assert_eq!(t.sub_index(-0.1), None);
        assert_eq!(t.sub_index(500.5), None);
        assert_eq!(t.sub_index(f64::NAN), None);
    }

    #[test]
    fn test_rejects_gap_between_brackets() {
        let err = BreakpointTable::from_rows(
            Pollutant::Pm25,
            &[[0.0, 12.0, 0.0, 50.0], [12.1, 35.4, 51.0, 100.0]],
        )
        .unwrap_err();
        assert!(matches!(err, BreakpointError::Gap { index: 1, .. }));
    }

    #[test]
    fn test_rejects_unsorted_and_negative() {
        let unsorted = BreakpointTable::from_rows(
            Pollutant::Pm10,
            &[[54.0, 154.0, 51.0, 100.0], [0.0, 54.0, 0.0, 50.0]],
        );
        assert!(matches!(unsorted, Err(BreakpointError::NotSorted { .. }) | Err(BreakpointError::Gap { .. })));

        let negative = BreakpointTable::from_rows(Pollutant::Pm10, &[[-1.0, 54.0, 0.0, 50.0]]);
        assert!(matches!(negative, Err(BreakpointError::InvalidBracket { .. })));

        let empty = BreakpointTable::from_rows(Pollutant::Pm10, &[]);
        assert_eq!(empty, Err(BreakpointError::Empty(Pollutant::Pm10)));
    }

    #[test]
    fn test_config_override_replaces_single_pollutant() {
        let mut config = BreakpointConfig::default();
        config
            .tables
            .insert("co".to_string(), vec![[0.0, 10.0, 0.0, 100.0]]);
        config.version = Some("site-2024".to_string());
        let set = BreakpointSet::from_config(&config).unwrap();
        assert_eq!(set.version(), "site-2024");
        assert_eq!(set.table(Pollutant::Co).unwrap().sub_index(5.0), Some(50.0));
        // untouched pollutant keeps the preset
        assert_eq!(set.table(Pollutant::Pm25).unwrap().sub_index(12.0), Some(50.0));
    }

    #[test]
    fn test_config_unknown_pollutant_is_error() {
        let mut config = BreakpointConfig::default();
        config.tables.insert("so2".to_string(), vec![[0.0, 1.0, 0.0, 1.0]]);
        assert_eq!(
            BreakpointSet::from_config(&config),
            Err(BreakpointError::UnknownPollutant("so2".to_string()))
        );
    }

    #[test]
    fn test_default_version_label_includes_scale() {
        let set = BreakpointSet::preset(BreakpointScale::Compact).unwrap();
        assert_eq!(set.version(), "epa-2012-compact");
    }
}
