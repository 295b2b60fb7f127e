//! Decoder: raw message bytes -> `SensorReading`
//!
//! Accepted shape (unknown fields ignored, `null` treated as absent):
//!
//! ```json
//! {"location_id": "bojongsoang", "observed_at": "2024-05-01 10:00:00",
//!  "latitude": -6.98, "longitude": 107.63,
//!  "pm2_5": 40.0, "pm10": 80.0, "o3": 0.04, "co": 2.0, "no2": 30.0}
//! ```
//!
//! Producer variants also accepted:
//! - `pm25` for `pm2_5`
//! - `timestamp` / `dt` for `observed_at`
//! - pollutant values nested under `pollution` (or `polution`)
//! - coordinates nested under `coord: {lat, lon}`
//!
//! Top-level values win over nested ones.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::types::{Pollutant, SensorReading};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("no pollutant values present")]
    NoPollutants,
}

#[derive(Debug, Default, Deserialize)]
struct PollutantFields {
    #[serde(alias = "pm25")]
    pm2_5: Option<f64>,
    pm10: Option<f64>,
    o3: Option<f64>,
    co: Option<f64>,
    no2: Option<f64>,
}

impl PollutantFields {
    fn get(&self, pollutant: Pollutant) -> Option<f64> {
        match pollutant {
            Pollutant::Pm25 => self.pm2_5,
            Pollutant::Pm10 => self.pm10,
            Pollutant::O3 => self.o3,
            Pollutant::Co => self.co,
            Pollutant::No2 => self.no2,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Coord {
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawReading {
    location_id: Option<String>,
    #[serde(alias = "timestamp", alias = "dt")]
    observed_at: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    coord: Option<Coord>,
    #[serde(flatten)]
    top: PollutantFields,
    #[serde(alias = "polution")]
    pollution: Option<PollutantFields>,
}

/// Decode one inbound message.
pub fn decode(bytes: &[u8]) -> Result<SensorReading, DecodeError> {
    let raw: RawReading =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let location_id = raw
        .location_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(DecodeError::MissingField("location_id"))?;

    let observed_at = raw
        .observed_at
        .filter(|s| !s.trim().is_empty())
        .ok_or(DecodeError::MissingField("observed_at"))?;

    let nested = raw.pollution.unwrap_or_default();
    let pollutants: BTreeMap<Pollutant, f64> = Pollutant::ALL
        .iter()
        .filter_map(|p| raw.top.get(*p).or_else(|| nested.get(*p)).map(|v| (*p, v)))
        .collect();
    if pollutants.is_empty() {
        return Err(DecodeError::NoPollutants);
    }

    let coord = raw.coord.unwrap_or_default();
    Ok(SensorReading {
        location_id,
        observed_at,
        latitude: raw.latitude.or(coord.lat),
        longitude: raw.longitude.or(coord.lon),
        pollutants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_canonical_message() {
        let msg = br#"{"location_id":"bojongsoang","observed_at":"2024-05-01 10:00:00",
            "latitude":-6.98,"longitude":107.63,
            "pm2_5":40.0,"pm10":80.0,"o3":0.04,"co":2.0,"no2":30.0}"#;
        let r = decode(msg).unwrap();
        assert_eq!(r.location_id, "bojongsoang");
        assert_eq!(r.observed_at, "2024-05-01 10:00:00");
        assert_eq!(r.latitude, Some(-6.98));
        assert_eq!(r.pollutants.len(), 5);
        assert_eq!(r.pollutants[&Pollutant::O3], 0.04);
    }

    #[test]
    fn test_decode_producer_variants() {
        let msg = br#"{"location_id":"dayeuhkolot","dt":"2024-05-01 10:00:00",
            "coord":{"lat":-6.99,"lon":107.62},
            "pm25":12.0,
            "polution":{"pm2_5":99.0,"pm10":20.0}}"#;
        let r = decode(msg).unwrap();
        assert_eq!(r.observed_at, "2024-05-01 10:00:00");
        assert_eq!(r.longitude, Some(107.62));
        // top-level wins over nested
        assert_eq!(r.pollutants[&Pollutant::Pm25], 12.0);
        assert_eq!(r.pollutants[&Pollutant::Pm10], 20.0);
    }

    #[test]
    fn test_null_pollutants_are_absent() {
        let msg = br#"{"location_id":"a","observed_at":"2024-05-01 10:00:00","pm2_5":null,"no2":5}"#;
        let r = decode(msg).unwrap();
        assert_eq!(r.pollutants.keys().copied().collect::<Vec<_>>(), vec![Pollutant::No2]);
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(decode(b"not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode(b"[1,2]"), Err(DecodeError::Malformed(_))));
        assert_eq!(
            decode(br#"{"observed_at":"2024-05-01 10:00:00","pm10":1}"#),
            Err(DecodeError::MissingField("location_id"))
        );
        assert_eq!(
            decode(br#"{"location_id":"  ","observed_at":"2024-05-01 10:00:00","pm10":1}"#),
            Err(DecodeError::MissingField("location_id"))
        );
        assert_eq!(
            decode(br#"{"location_id":"a","pm10":1}"#),
            Err(DecodeError::MissingField("observed_at"))
        );
        assert_eq!(
            decode(br#"{"location_id":"a","observed_at":"2024-05-01 10:00:00"}"#),
            Err(DecodeError::NoPollutants)
        );
    }

    #[test]
    fn test_non_numeric_pollutant_is_malformed() {
        let msg = br#"{"location_id":"a","observed_at":"x","pm10":"high"}"#;
        assert!(matches!(decode(msg), Err(DecodeError::Malformed(_))));
    }
}
