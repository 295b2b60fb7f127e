//! Weather ingest: drains the weather spool into the side table.
//!
//! Runs next to the scoring workers inside `aqi-pipeline run`, so the side
//! table keeps moving while readings are scored. Each spool message holds one
//! or more JSON observations, one per line. Messages are acknowledged once
//! every line is either recorded or rejected as malformed; a message whose
//! write failed stays on disk and is picked up again on the next start.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::WeatherWriter;
use crate::config::defaults::QUEUE_ERROR_BACKOFF_MS;
use crate::config::WeatherConfig;
use crate::source::{Delivery, QueueError, QueueEvent, ReadingQueue, SpoolQueue};
use crate::types::WeatherObservation;

/// Counts from one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub recorded: u64,
    /// Lines that were not a valid observation.
    pub skipped: u64,
    /// Observations the table refused; their message stays spooled.
    pub failed: u64,
}

pub struct WeatherIngest {
    spool: SpoolQueue,
    writer: Arc<dyn WeatherWriter>,
}

impl WeatherIngest {
    pub fn new(spool: SpoolQueue, writer: Arc<dyn WeatherWriter>) -> Self {
        Self { spool, writer }
    }

    /// Open the spool named by `[weather]`. With `drain_once` the run ends
    /// as soon as the spool is empty.
    pub fn open(
        config: &WeatherConfig,
        writer: Arc<dyn WeatherWriter>,
        drain_once: bool,
    ) -> Result<Self, QueueError> {
        let spool = SpoolQueue::open(
            &config.spool_dir,
            Duration::from_millis(config.poll_interval_ms),
        )?
        .close_when_empty(drain_once);
        Ok(Self::new(spool, writer))
    }

    /// Record spooled observations until cancelled or the spool closes.
    pub async fn run(&self, cancel_token: CancellationToken) -> IngestReport {
        let mut report = IngestReport::default();
        loop {
            let event = tokio::select! {
                _ = cancel_token.cancelled() => break,
                result = self.spool.receive() => result,
            };

            match event {
                Ok(QueueEvent::Delivery(delivery)) => self.ingest(delivery, &mut report).await,
                Ok(QueueEvent::Closed) => break,
                Err(e) => {
                    warn!(error = %e, "Weather spool receive failed");
                    tokio::select! {
                        _ = cancel_token.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_millis(QUEUE_ERROR_BACKOFF_MS)) => {}
                    }
                }
            }
        }

        if report != IngestReport::default() {
            info!(
                recorded = report.recorded,
                skipped = report.skipped,
                failed = report.failed,
                "Weather ingest stopped"
            );
        }
        report
    }

    async fn ingest(&self, delivery: Delivery, report: &mut IngestReport) {
        let mut write_failed = false;

        for (n, line) in delivery.payload.split(|b| *b == b'\n').enumerate() {
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            let observation = match serde_json::from_slice::<WeatherObservation>(line) {
                Ok(o) => o,
                Err(e) => {
                    warn!(file = %delivery.id, line = n + 1, error = %e, "Skipping invalid weather observation");
                    report.skipped += 1;
                    continue;
                }
            };

            let location = observation.location_id.clone();
            match self.writer.insert(observation).await {
                Ok(()) => {
                    debug!(location = %location, "Weather observation recorded");
                    report.recorded += 1;
                }
                Err(e) => {
                    warn!(file = %delivery.id, location = %location, error = %e, "Weather write failed");
                    report.failed += 1;
                    write_failed = true;
                }
            }
        }

        if write_failed {
            return;
        }
        if let Err(e) = self.spool.ack(&delivery.id).await {
            warn!(file = %delivery.id, error = %e, "Weather ack failed, message may be ingested again");
        }
    }
}
