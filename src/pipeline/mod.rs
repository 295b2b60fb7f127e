//! Processing Pipeline Module
//!
//! ```text
//! Queue -> decode -> validate/clean -> enrich (weather) -> AQI -> sink (current + analytical) -> ack
//! ```
//!
//! Every reading taken off the queue ends in exactly one terminal state,
//! `Persisted` or `Discarded(reason)`, and is acknowledged either way.

pub mod decoder;
pub mod validator;
pub mod enricher;
pub mod retry;
pub mod sink;
mod stats;
mod processor;
pub mod processing_loop;
mod coordinator;

pub use coordinator::{PipelineCoordinator, PipelineError};
pub use processor::{DiscardReason, Outcome, ReadingProcessor, ReadingState};
pub use stats::{PipelineStats, StatsSnapshot};
