//! AQI Pipeline: air-quality ingestion and scoring
//!
//! Streaming pipeline that turns raw sensor telemetry into Air Quality Index
//! records.
//!
//! ## Architecture
//!
//! - **Source**: inbound queue of raw JSON readings (spool directory, stdin, in-process)
//! - **Pipeline**: decode -> validate/clean -> enrich with weather -> score -> persist -> ack
//! - **AQI**: configurable, versioned breakpoint tables and the piecewise-linear calculator
//! - **Weather**: side table of observations per location, read by the enricher and fed by the weather spool
//! - **Storage**: current-value store and deduplicated analytical log
//! - **API**: optional read-only HTTP view

pub mod config;
pub mod types;
pub mod aqi;
pub mod source;
pub mod weather;
pub mod storage;
pub mod model;
pub mod pipeline;
pub mod api;

pub use config::PipelineConfig;

pub use types::{
    AqiCategory, AqiResult, CleanReading, EnrichedReading, EnrichmentStatus, Pollutant,
    ScoredReading, SensorReading, WeatherObservation,
};

pub use aqi::{AqiCalculator, BreakpointSet, BreakpointTable};

pub use pipeline::{Outcome, PipelineCoordinator, PipelineStats, ReadingProcessor, StatsSnapshot};

pub use storage::{StorageError, Stores};
