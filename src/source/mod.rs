//! Inbound queue abstraction.
//!
//! Workers pull raw reading payloads from a shared queue and acknowledge
//! them once the reading reached a terminal state. Push-notify (in-process
//! channel) and poll-based (directory spool) transports implement the same
//! trait, so the processing loop sees one restartable stream of deliveries.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{QueueConfig, QueueKind};

mod memory;
mod spool;
mod stdin;

pub use memory::MemoryQueue;
pub use spool::SpoolQueue;
pub use stdin::StdinQueue;

/// One message taken off the queue, not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Transport-specific handle passed back to [`ReadingQueue::ack`].
    pub id: String,
    pub payload: Vec<u8>,
}

/// Events produced by a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Delivery(Delivery),
    /// The queue will never yield another delivery (EOF, closed channel).
    Closed,
}

/// Where reading payloads come from.
///
/// Shared by every worker (`Arc<dyn ReadingQueue>`), so implementations use
/// interior synchronisation. A delivery that is never acknowledged stays
/// eligible for redelivery: at-least-once.
#[async_trait]
pub trait ReadingQueue: Send + Sync + 'static {
    /// Wait for the next delivery.
    async fn receive(&self) -> Result<QueueEvent, QueueError>;

    /// Remove a delivery from the queue permanently.
    async fn ack(&self, delivery_id: &str) -> Result<(), QueueError>;

    /// Human-readable name for logging (e.g. "memory", "spool", "stdin").
    fn queue_name(&self) -> &str;
}

/// Queue errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Open the queue selected by `[queue]`.
///
/// With `drain_once` the spool closes as soon as it is empty instead of
/// polling forever; stdin always closes at EOF.
pub fn open_queue(config: &QueueConfig, drain_once: bool) -> Result<Arc<dyn ReadingQueue>, QueueError> {
    Ok(match config.kind {
        QueueKind::Spool => Arc::new(
            SpoolQueue::open(
                &config.spool_dir,
                std::time::Duration::from_millis(config.poll_interval_ms),
            )?
            .close_when_empty(drain_once),
        ),
        QueueKind::Stdin => Arc::new(StdinQueue::new()),
    })
}
