//! AQI result types: AqiCategory, AqiResult

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Pollutant;

/// Health category derived from the rounded overall index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitive,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    /// Map a rounded overall index to its category.
    ///
    /// `[0,50] Good, [51,100] Moderate, [101,150] UnhealthyForSensitive,
    /// [151,200] Unhealthy, [201,300] VeryUnhealthy, >300 Hazardous`.
    pub fn from_index(index: u32) -> Self {
        match index {
            0..=50 => AqiCategory::Good,
            51..=100 => AqiCategory::Moderate,
            101..=150 => AqiCategory::UnhealthyForSensitive,
            151..=200 => AqiCategory::Unhealthy,
            201..=300 => AqiCategory::VeryUnhealthy,
            _ => AqiCategory::Hazardous,
        }
    }

    /// Human-readable label used in logs and the read API.
    pub fn label(self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitive => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}

impl std::fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Output of the AQI calculator for one reading.
///
/// Only constructed when at least one sub-index is defined, so
/// `overall_index` and `dominant_pollutant` are always meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqiResult {
    /// Sub-index per pollutant present in the reading; `None` when the
    /// concentration matched no bracket.
    pub sub_indices: BTreeMap<Pollutant, Option<f64>>,
    /// `round(max(defined sub-indices))`
    pub overall_index: u32,
    pub category: AqiCategory,
    /// Pollutant contributing the maximum sub-index.
    pub dominant_pollutant: Pollutant,
}

impl AqiResult {
    /// Number of pollutants with a defined sub-index.
    pub fn defined_count(&self) -> usize {
        self.sub_indices.values().filter(|v| v.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_boundaries() {
        assert_eq!(AqiCategory::from_index(0), AqiCategory::Good);
        assert_eq!(AqiCategory::from_index(50), AqiCategory::Good);
        assert_eq!(AqiCategory::from_index(51), AqiCategory::Moderate);
        assert_eq!(AqiCategory::from_index(100), AqiCategory::Moderate);
        assert_eq!(AqiCategory::from_index(101), AqiCategory::UnhealthyForSensitive);
        assert_eq!(AqiCategory::from_index(150), AqiCategory::UnhealthyForSensitive);
        assert_eq!(AqiCategory::from_index(151), AqiCategory::Unhealthy);
        assert_eq!(AqiCategory::from_index(200), AqiCategory::Unhealthy);
        assert_eq!(AqiCategory::from_index(201), AqiCategory::VeryUnhealthy);
        assert_eq!(AqiCategory::from_index(300), AqiCategory::VeryUnhealthy);
        assert_eq!(AqiCategory::from_index(301), AqiCategory::Hazardous);
        assert_eq!(AqiCategory::from_index(500), AqiCategory::Hazardous);
    }

    #[test]
    fn test_category_label() {
        assert_eq!(
            AqiCategory::UnhealthyForSensitive.to_string(),
            "Unhealthy for Sensitive Groups"
        );
    }
}
