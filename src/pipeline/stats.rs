//! Pipeline counters shared by all workers.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use super::sink::{SinkReport, WriteOutcome};

/// Lock-free counters, one per state transition and failure kind.
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    decode_errors: AtomicU64,
    validation_errors: AtomicU64,
    no_score: AtomicU64,
    scored: AtomicU64,
    degraded: AtomicU64,
    weather_not_found: AtomicU64,
    unavailable_values: AtomicU64,
    current_written: AtomicU64,
    current_failed: AtomicU64,
    analytical_inserted: AtomicU64,
    analytical_duplicates: AtomicU64,
    analytical_failed: AtomicU64,
    sink_retries: AtomicU64,
    acked: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub decode_errors: u64,
    pub validation_errors: u64,
    pub no_score: u64,
    pub scored: u64,
    pub degraded: u64,
    pub weather_not_found: u64,
    pub unavailable_values: u64,
    pub current_written: u64,
    pub current_failed: u64,
    pub analytical_inserted: u64,
    pub analytical_duplicates: u64,
    pub analytical_failed: u64,
    pub sink_retries: u64,
    pub acked: u64,
}

impl StatsSnapshot {
    pub fn discarded(&self) -> u64 {
        self.decode_errors + self.validation_errors + self.no_score
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline: {} received, {} scored ({} degraded), {} discarded \
             (decode {}, validation {}, no score {}), current {} ok / {} failed, \
             analytical {} new / {} dup / {} failed, {} acked",
            self.received,
            self.scored,
            self.degraded,
            self.discarded(),
            self.decode_errors,
            self.validation_errors,
            self.no_score,
            self.current_written,
            self.current_failed,
            self.analytical_inserted,
            self.analytical_duplicates,
            self.analytical_failed,
            self.acked
        )
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        bump(&self.received);
    }

    pub fn record_decode_error(&self) {
        bump(&self.decode_errors);
    }

    pub fn record_validation_error(&self) {
        bump(&self.validation_errors);
    }

    pub fn record_no_score(&self) {
        bump(&self.no_score);
    }

    pub fn record_unavailable(&self, count: usize) {
        self.unavailable_values.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_scored(&self, degraded: bool, weather_found: bool) {
        bump(&self.scored);
        if degraded {
            bump(&self.degraded);
        } else if !weather_found {
            bump(&self.weather_not_found);
        }
    }

    pub fn record_sink(&self, report: &SinkReport) {
        match &report.current {
            WriteOutcome::Failed { .. } => bump(&self.current_failed),
            _ => bump(&self.current_written),
        }
        match &report.analytical {
            WriteOutcome::Written { .. } => bump(&self.analytical_inserted),
            WriteOutcome::Duplicate { .. } => bump(&self.analytical_duplicates),
            WriteOutcome::Failed { .. } => bump(&self.analytical_failed),
        }
        let retries = u64::from(report.current.attempts().saturating_sub(1))
            + u64::from(report.analytical.attempts().saturating_sub(1));
        self.sink_retries.fetch_add(retries, Ordering::Relaxed);
    }

    /// Returns the process-wide acknowledged total.
    pub fn record_acked(&self) -> u64 {
        self.acked.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            received: get(&self.received),
            decode_errors: get(&self.decode_errors),
            validation_errors: get(&self.validation_errors),
            no_score: get(&self.no_score),
            scored: get(&self.scored),
            degraded: get(&self.degraded),
            weather_not_found: get(&self.weather_not_found),
            unavailable_values: get(&self.unavailable_values),
            current_written: get(&self.current_written),
            current_failed: get(&self.current_failed),
            analytical_inserted: get(&self.analytical_inserted),
            analytical_duplicates: get(&self.analytical_duplicates),
            analytical_failed: get(&self.analytical_failed),
            sink_retries: get(&self.sink_retries),
            acked: get(&self.acked),
        }
    }
}
