//! Per-reading state machine
//!
//! ```text
//! Received -> Decoded -> Validated -> Enriched -> Scored -> Persisted -> Acknowledged
//!     |           |            |                     |
//!     +-> Discarded(decode)    +-> Discarded(validation)
//!                              +-> Discarded(no_score)
//! ```
//!
//! `Persisted` means both sink writes were attempted (each succeeded, found a
//! duplicate, or exhausted its retries). Acknowledgement is done by the
//! processing loop for every terminal outcome, discarded ones included.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::decoder::{decode, DecodeError};
use super::enricher::Enricher;
use super::retry::RetryPolicy;
use super::sink::{SinkReport, SinkWriter};
use super::stats::PipelineStats;
use super::validator::{Cleaner, ValidationError};
use crate::aqi::{AqiCalculator, BreakpointError};
use crate::config::PipelineConfig;
use crate::model::{AqiPredictor, ModelFeatures};
use crate::storage::Stores;
use crate::types::{ScoredReading, SensorReading};

/// Lifecycle position of one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingState {
    Received,
    Decoded,
    Validated,
    Enriched,
    Scored,
    Persisted,
    Acknowledged,
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    DecodeError,
    ValidationError,
    NoScore,
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiscardReason::DecodeError => "decode_error",
            DiscardReason::ValidationError => "validation_error",
            DiscardReason::NoScore => "no_score",
        };
        write!(f, "{s}")
    }
}

/// Terminal outcome of [`ReadingProcessor::process`]; always acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Persisted {
        scored: Box<ScoredReading>,
        report: SinkReport,
    },
    Discarded {
        reason: DiscardReason,
        detail: String,
    },
}

impl Outcome {
    pub fn state(&self) -> ReadingState {
        match self {
            Outcome::Persisted { .. } => ReadingState::Persisted,
            Outcome::Discarded { reason, .. } => ReadingState::Discarded(*reason),
        }
    }

    fn discarded(reason: DiscardReason, detail: impl Into<String>) -> Self {
        Outcome::Discarded {
            reason,
            detail: detail.into(),
        }
    }
}

/// Everything one worker needs to take a payload to a terminal state.
///
/// Collaborators are shared handles; cloning is cheap.
#[derive(Clone)]
pub struct ReadingProcessor {
    cleaner: Cleaner,
    enricher: Enricher,
    calculator: AqiCalculator,
    sink: SinkWriter,
    predictor: Option<Arc<dyn AqiPredictor>>,
    stats: Arc<PipelineStats>,
}

impl ReadingProcessor {
    pub fn new(
        cleaner: Cleaner,
        enricher: Enricher,
        calculator: AqiCalculator,
        sink: SinkWriter,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            cleaner,
            enricher,
            calculator,
            sink,
            predictor: None,
            stats,
        }
    }

    /// Wire every stage from configuration and the process-wide stores.
    pub fn from_config(
        config: &PipelineConfig,
        stores: &Stores,
        stats: Arc<PipelineStats>,
    ) -> Result<Self, BreakpointError> {
        Ok(Self::new(
            Cleaner::from_config(config),
            Enricher::new(
                stores.weather.clone(),
                Duration::from_millis(config.timeouts.weather_lookup_ms),
            ),
            AqiCalculator::from_config(config)?,
            SinkWriter::new(
                stores.current.clone(),
                stores.analytical.clone(),
                RetryPolicy::from_config(&config.retry, &config.timeouts),
            ),
            stats,
        ))
    }

    pub fn with_predictor(mut self, predictor: Option<Arc<dyn AqiPredictor>>) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Run one raw payload through decode, clean, enrich, score and persist.
    pub async fn process(&self, payload: &[u8]) -> Outcome {
        self.stats.record_received();
        trace!(state = ?ReadingState::Received, bytes = payload.len());

        match decode(payload) {
            Ok(reading) => self.process_reading(reading).await,
            Err(e) => self.discard_decode(&e),
        }
    }

    /// Entry point for an already-decoded reading.
    pub async fn process_reading(&self, reading: SensorReading) -> Outcome {
        trace!(state = ?ReadingState::Decoded, location = %reading.location_id);

        let clean = match self.cleaner.clean(&reading) {
            Ok(clean) => clean,
            Err(e) => return self.discard_validation(&reading, &e),
        };
        if !clean.unavailable.is_empty() {
            self.stats.record_unavailable(clean.unavailable.len());
        }
        trace!(state = ?ReadingState::Validated, location = %clean.location_id);

        let enriched = self.enricher.enrich(clean).await;
        trace!(state = ?ReadingState::Enriched, enrichment = ?enriched.enrichment);

        let Some(aqi) = self.calculator.compute(&enriched.reading) else {
            debug!(
                location = %enriched.reading.location_id,
                observed_at = %enriched.reading.observed_at,
                "No defined sub-index, reading dropped"
            );
            self.stats.record_no_score();
            return Outcome::discarded(DiscardReason::NoScore, "no pollutant within any bracket");
        };

        let prediction = self.predictor.as_ref().and_then(|model| {
            ModelFeatures::from_enriched(&enriched).map(|f| model.predict(&f))
        });

        self.stats
            .record_scored(enriched.enrichment.is_degraded(), enriched.weather.is_some());
        let scored = ScoredReading {
            reading: enriched.reading,
            weather: enriched.weather,
            enrichment: enriched.enrichment,
            aqi,
            prediction,
            table_version: self.calculator.table_version().to_string(),
        };
        debug!(
            state = ?ReadingState::Scored,
            location = %scored.reading.location_id,
            aqi = scored.aqi.overall_index,
            category = %scored.aqi.category,
            dominant = %scored.aqi.dominant_pollutant,
            "Reading scored"
        );

        let report = self.sink.write(&scored).await;
        self.stats.record_sink(&report);

        Outcome::Persisted {
            scored: Box::new(scored),
            report,
        }
    }

    fn discard_decode(&self, e: &DecodeError) -> Outcome {
        warn!(error = %e, "Dropping undecodable message");
        self.stats.record_decode_error();
        Outcome::discarded(DiscardReason::DecodeError, e.to_string())
    }

    fn discard_validation(&self, reading: &SensorReading, e: &ValidationError) -> Outcome {
        warn!(location = %reading.location_id, error = %e, "Dropping invalid reading");
        self.stats.record_validation_error();
        Outcome::discarded(DiscardReason::ValidationError, e.to_string())
    }
}
