//! Enricher: best-effort weather join
//!
//! Never fails a reading. A missing observation leaves weather unset; a
//! backend error or a lookup exceeding its budget also leaves it unset and
//! flags the reading as degraded.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{CleanReading, EnrichedReading, EnrichmentStatus};
use crate::weather::WeatherLookup;

#[derive(Clone)]
pub struct Enricher {
    lookup: Arc<dyn WeatherLookup>,
    timeout: Duration,
}

impl Enricher {
    pub fn new(lookup: Arc<dyn WeatherLookup>, timeout: Duration) -> Self {
        Self { lookup, timeout }
    }

    pub async fn enrich(&self, reading: CleanReading) -> EnrichedReading {
        let lookup = self.lookup.latest(&reading.location_id, reading.observed_at);
        let (weather, enrichment) = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(Some(obs))) => {
                let status = if obs.observed_at <= reading.observed_at {
                    EnrichmentStatus::Matched
                } else {
                    EnrichmentStatus::Fallback
                };
                (Some(obs), status)
            }
            Ok(Ok(None)) => {
                debug!(location = %reading.location_id, "No weather observation for location");
                (None, EnrichmentStatus::NotFound)
            }
            Ok(Err(e)) => {
                warn!(
                    location = %reading.location_id,
                    backend = self.lookup.backend_name(),
                    error = %e,
                    "Weather lookup failed, continuing degraded"
                );
                (None, EnrichmentStatus::Degraded)
            }
            Err(_) => {
                warn!(
                    location = %reading.location_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Weather lookup timed out, continuing degraded"
                );
                (None, EnrichmentStatus::Degraded)
            }
        };

        EnrichedReading {
            reading,
            weather,
            enrichment,
        }
    }
}
