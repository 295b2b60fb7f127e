//! Pipeline Configuration Module
//!
//! Breakpoint tables, unit factors, envelopes, retry policy, timeouts and
//! backend selection, loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` CLI flag
//! 2. `AQI_PIPELINE_CONFIG` environment variable (path to TOML file)
//! 3. `aqi_pipeline.toml` in the current working directory
//! 4. Built-in defaults
//!
//! The loaded config is validated once and then shared read-only as
//! `Arc<PipelineConfig>`; workers never see a partially valid config.

mod pipeline_config;
pub mod defaults;
pub mod validation;

pub use pipeline_config::*;
