//! Sink Writer: dual-store persistence for scored readings
//!
//! The current-store upsert and the analytical append are independent: they
//! run concurrently, each with its own retry budget, and one failing never
//! blocks or rolls back the other.

use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use super::retry::RetryPolicy;
use crate::storage::{AnalyticalStore, AppendOutcome, CurrentStore};
use crate::types::ScoredReading;

/// Result of one sink write after retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteOutcome {
    Written { attempts: u32 },
    /// Analytical only: a row with the same dedup key already existed.
    Duplicate { attempts: u32 },
    Failed { attempts: u32, error: String },
}

impl WriteOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, WriteOutcome::Failed { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            WriteOutcome::Written { attempts }
            | WriteOutcome::Duplicate { attempts }
            | WriteOutcome::Failed { attempts, .. } => *attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkReport {
    pub current: WriteOutcome,
    pub analytical: WriteOutcome,
}

impl SinkReport {
    pub fn fully_persisted(&self) -> bool {
        !self.current.is_failed() && !self.analytical.is_failed()
    }
}

#[derive(Clone)]
pub struct SinkWriter {
    current: Arc<dyn CurrentStore>,
    analytical: Arc<dyn AnalyticalStore>,
    policy: RetryPolicy,
}

impl SinkWriter {
    pub fn new(
        current: Arc<dyn CurrentStore>,
        analytical: Arc<dyn AnalyticalStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            current,
            analytical,
            policy,
        }
    }

    /// Attempt both writes. Always returns; failures are logged and reported.
    pub async fn write(&self, scored: &ScoredReading) -> SinkReport {
        let doc = scored.to_current_document();
        let row = scored.to_analytical_row();
        let (doc, row) = (&doc, &row);
        let (current, analytical) = (&self.current, &self.analytical);

        let (current_result, analytical_result) = tokio::join!(
            self.policy.run("current_upsert", move || current.upsert(doc)),
            self.policy.run("analytical_append", move || analytical.append_if_absent(row)),
        );

        let current = match current_result {
            Ok(((), attempts)) => WriteOutcome::Written { attempts },
            Err(e) => {
                error!(
                    location = %scored.reading.location_id,
                    observed_at = %scored.reading.observed_at,
                    backend = self.current.backend_name(),
                    error = %e,
                    "Current store write failed, giving up"
                );
                WriteOutcome::Failed {
                    attempts: e.attempts,
                    error: e.to_string(),
                }
            }
        };

        let analytical = match analytical_result {
            Ok((AppendOutcome::Inserted, attempts)) => WriteOutcome::Written { attempts },
            Ok((AppendOutcome::Duplicate, attempts)) => WriteOutcome::Duplicate { attempts },
            Err(e) => {
                error!(
                    location = %scored.reading.location_id,
                    observed_at = %scored.reading.observed_at,
                    backend = self.analytical.backend_name(),
                    error = %e,
                    "Analytical store write failed, giving up"
                );
                WriteOutcome::Failed {
                    attempts: e.attempts,
                    error: e.to_string(),
                }
            }
        };

        SinkReport { current, analytical }
    }
}
