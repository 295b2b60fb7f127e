//! Pollutant identifiers

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Pollutants scored by the AQI calculator.
///
/// Serialized names match the inbound wire format (`pm2_5`, `pm10`, `o3`,
/// `co`, `no2`). Ordering follows declaration order so maps keyed by
/// `Pollutant` iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pollutant {
    #[serde(rename = "pm2_5", alias = "pm25")]
    Pm25,
    #[serde(rename = "pm10")]
    Pm10,
    #[serde(rename = "o3")]
    O3,
    #[serde(rename = "co")]
    Co,
    #[serde(rename = "no2")]
    No2,
}

impl Pollutant {
    /// Every scored pollutant, in canonical order.
    pub const ALL: [Pollutant; 5] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::O3,
        Pollutant::Co,
        Pollutant::No2,
    ];

    /// Wire / config key for this pollutant.
    pub fn key(self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm2_5",
            Pollutant::Pm10 => "pm10",
            Pollutant::O3 => "o3",
            Pollutant::Co => "co",
            Pollutant::No2 => "no2",
        }
    }
}

impl std::fmt::Display for Pollutant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pollutant::Pm25 => write!(f, "PM2.5"),
            Pollutant::Pm10 => write!(f, "PM10"),
            Pollutant::O3 => write!(f, "O3"),
            Pollutant::Co => write!(f, "CO"),
            Pollutant::No2 => write!(f, "NO2"),
        }
    }
}

/// Error returned when a string does not name a known pollutant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pollutant '{0}' (expected one of pm2_5, pm10, o3, co, no2)")]
pub struct UnknownPollutant(pub String);

impl FromStr for Pollutant {
    type Err = UnknownPollutant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pm2_5" | "pm25" | "pm2.5" => Ok(Pollutant::Pm25),
            "pm10" => Ok(Pollutant::Pm10),
            "o3" => Ok(Pollutant::O3),
            "co" => Ok(Pollutant::Co),
            "no2" => Ok(Pollutant::No2),
            other => Err(UnknownPollutant(other.to_string())),
        }
    }
}
