//! AQI Calculator: concentrations -> sub-indices -> overall index -> category
//!
//! Pure and deterministic. Sub-indices stay real-valued; rounding happens
//! exactly once, on the maximum.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{BreakpointError, BreakpointSet};
use crate::config::PipelineConfig;
use crate::types::{AqiCategory, AqiResult, CleanReading, Pollutant};

/// Shared, read-only scorer. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AqiCalculator {
    breakpoints: Arc<BreakpointSet>,
    unit_factors: Arc<BTreeMap<Pollutant, f64>>,
}

impl AqiCalculator {
    pub fn new(breakpoints: Arc<BreakpointSet>, unit_factors: BTreeMap<Pollutant, f64>) -> Self {
        Self {
            breakpoints,
            unit_factors: Arc::new(unit_factors),
        }
    }

    /// Build tables and unit factors from configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, BreakpointError> {
        let breakpoints = Arc::new(config.breakpoint_set()?);
        let unit_factors = config
            .all_pollutant_settings()
            .into_iter()
            .map(|(p, s)| (p, s.unit_factor))
            .collect();
        Ok(Self::new(breakpoints, unit_factors))
    }

    pub fn table_version(&self) -> &str {
        self.breakpoints.version()
    }

    pub fn breakpoints(&self) -> &BreakpointSet {
        &self.breakpoints
    }

    /// Sub-index for a concentration in delivered units.
    pub fn sub_index(&self, pollutant: Pollutant, concentration: f64) -> Option<f64> {
        let factor = self.unit_factors.get(&pollutant).copied().unwrap_or(1.0);
        self.breakpoints
            .table(pollutant)?
            .sub_index(concentration * factor)
    }

    /// Score a cleaned reading.
    ///
    /// Returns `None` when no pollutant has a defined sub-index; such a
    /// reading must not be persisted. Pollutants the cleaner marked
    /// unavailable appear in `sub_indices` as undefined.
    pub fn compute(&self, reading: &CleanReading) -> Option<AqiResult> {
        let mut sub_indices: BTreeMap<Pollutant, Option<f64>> = reading
            .pollutants
            .iter()
            .map(|(p, c)| (*p, self.sub_index(*p, *c)))
            .collect();
        for p in &reading.unavailable {
            sub_indices.entry(*p).or_insert(None);
        }

        // BTreeMap iterates in canonical order; strict `>` keeps the first
        // pollutant on ties
        let mut dominant: Option<(Pollutant, f64)> = None;
        for (p, sub) in &sub_indices {
            if let Some(v) = sub {
                if dominant.map_or(true, |(_, best)| *v > best) {
                    dominant = Some((*p, *v));
                }
            }
        }

        let (dominant_pollutant, max) = dominant?;
        let overall_index = round_index(max);

        Some(AqiResult {
            sub_indices,
            overall_index,
            category: AqiCategory::from_index(overall_index),
            dominant_pollutant,
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_index(value: f64) -> u32 {
    // Sub-indices are finite and non-negative (table invariants)
    value.round().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aqi::BreakpointScale;
    use crate::types::timefmt;

    fn calculator() -> AqiCalculator {
        AqiCalculator::from_config(&PipelineConfig::default()).unwrap()
    }

    fn reading(values: &[(Pollutant, f64)]) -> CleanReading {
        CleanReading {
            location_id: "bojongsoang".to_string(),
            observed_at: timefmt::parse_lenient("2024-05-01 10:00:00").unwrap(),
            latitude: Some(-6.98),
            longitude: Some(107.63),
            pollutants: values.iter().copied().collect(),
            unavailable: Vec::new(),
        }
    }

    #[test]
    fn test_pm25_boundaries() {
        let calc = calculator();
        assert_eq!(calc.sub_index(Pollutant::Pm25, 12.0), Some(50.0));
        assert_eq!(calc.sub_index(Pollutant::Pm25, 35.4), Some(100.0));
        let just_above = calc.sub_index(Pollutant::Pm25, 12.1).unwrap();
        assert!(just_above > 51.0 && just_above < 51.5, "got {just_above}");
    }

    #[test]
    fn test_all_zero_is_good() {
        let calc = calculator();
        let r = reading(&Pollutant::ALL.map(|p| (p, 0.0)));
        let result = calc.compute(&r).unwrap();
        assert_eq!(result.overall_index, 0);
        assert_eq!(result.category, AqiCategory::Good);
        assert_eq!(result.defined_count(), 5);
        // ties resolve to the first pollutant in canonical order
        assert_eq!(result.dominant_pollutant, Pollutant::Pm25);
    }

    #[test]
    fn test_bojongsoang_reading() {
        let calc = calculator();
        let r = reading(&[
            (Pollutant::Pm25, 40.0),
            (Pollutant::Pm10, 80.0),
            (Pollutant::O3, 0.04),
            (Pollutant::Co, 2.0),
            (Pollutant::No2, 30.0),
        ]);
        let result = calc.compute(&r).unwrap();
        assert_eq!(result.defined_count(), 5);

        let pm25 = result.sub_indices[&Pollutant::Pm25].unwrap();
        assert!((pm25 - 112.27).abs() < 0.01, "pm2_5 sub-index {pm25}");
        let pm10 = result.sub_indices[&Pollutant::Pm10].unwrap();
        assert!((pm10 - 63.74).abs() < 0.01, "pm10 sub-index {pm10}");

        assert_eq!(result.overall_index, 112);
        assert_eq!(result.category, AqiCategory::UnhealthyForSensitive);
        assert_eq!(result.dominant_pollutant, Pollutant::Pm25);
    }

    #[test]
    fn test_out_of_table_excluded_not_zero() {
        let calc = calculator();
        let r = reading(&[(Pollutant::Pm25, 600.0), (Pollutant::Pm10, 30.0)]);
        let result = calc.compute(&r).unwrap();
        assert_eq!(result.sub_indices[&Pollutant::Pm25], None);
        assert_eq!(result.dominant_pollutant, Pollutant::Pm10);
        assert_eq!(result.overall_index, 28);
    }

    #[test]
    fn test_nothing_defined_is_undefined() {
        let calc = calculator();
        assert!(calc.compute(&reading(&[(Pollutant::Pm25, 9999.0)])).is_none());
        assert!(calc.compute(&reading(&[])).is_none());
    }

    #[test]
    fn test_unavailable_pollutants_reported_undefined() {
        let calc = calculator();
        let mut r = reading(&[(Pollutant::Pm10, 30.0)]);
        r.unavailable.push(Pollutant::Pm25);
        let result = calc.compute(&r).unwrap();
        assert_eq!(result.sub_indices.get(&Pollutant::Pm25), Some(&None));
        assert_eq!(result.defined_count(), 1);
    }

    #[test]
    fn test_unit_factor_converts_before_lookup() {
        let mut config = PipelineConfig::default();
        config.pollutants.insert(
            "co".to_string(),
            crate::config::PollutantOverrides {
                unit_factor: Some(0.001),
                envelope: Some([0.0, 100_000.0]),
                ..Default::default()
            },
        );
        let calc = AqiCalculator::from_config(&config).unwrap();
        // 4400 ppb == 4.4 ppm
        assert_eq!(calc.sub_index(Pollutant::Co, 4400.0), Some(50.0));
    }

    #[test]
    fn test_compact_scale_leaves_hazardous_undefined() {
        let mut config = PipelineConfig::default();
        config.breakpoints.scale = BreakpointScale::Compact;
        let calc = AqiCalculator::from_config(&config).unwrap();
        assert!(calc.compute(&reading(&[(Pollutant::Pm25, 300.0)])).is_none());
        assert_eq!(calc.table_version(), "epa-2012-compact");
    }

    #[test]
    fn test_rounding_happens_once_on_max() {
        let calc = calculator();
        // pm10 54.5 -> 51 + 49/100 * 0.5 = 51.245 -> 51
        let result = calc.compute(&reading(&[(Pollutant::Pm10, 54.5)])).unwrap();
        assert_eq!(result.overall_index, 51);
        assert_eq!(result.category, AqiCategory::Moderate);
    }
}
