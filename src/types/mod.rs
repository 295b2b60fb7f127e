//! Shared data structures for the air-quality scoring pipeline
//!
//! Types follow a reading through the pipeline stages:
//! - Decode: `SensorReading` (raw timestamp, pollutants present in payload)
//! - Validate/Clean: `CleanReading` (parsed timestamp, in-envelope values)
//! - Enrich: `EnrichedReading` (+ optional `WeatherObservation`)
//! - Score: `ScoredReading` (+ `AqiResult`)
//! - Persist: `CurrentAqiDocument`, `AnalyticalRow`

mod pollutant;
mod reading;
mod weather;
mod aqi;
mod scored;
pub mod timefmt;

pub use pollutant::*;
pub use reading::*;
pub use weather::*;
pub use aqi::*;
pub use scored::*;
