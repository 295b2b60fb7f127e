//! Worker loop: receive -> process -> acknowledge.
//!
//! Every worker runs one [`ProcessingLoop`] against the shared queue. A
//! reading already taken off the queue is always driven to a terminal state
//! and acknowledged before the loop looks at the cancellation token again.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::processor::{Outcome, ReadingProcessor, ReadingState};
use crate::config::defaults::{PROGRESS_LOG_EVERY, QUEUE_ERROR_BACKOFF_MS};
use crate::source::{Delivery, QueueEvent, ReadingQueue};

/// Why a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Cancelled,
    QueueClosed,
}

pub struct ProcessingLoop {
    worker_id: usize,
    processor: ReadingProcessor,
    queue: Arc<dyn ReadingQueue>,
    cancel_token: CancellationToken,
}

impl ProcessingLoop {
    pub fn new(
        worker_id: usize,
        processor: ReadingProcessor,
        queue: Arc<dyn ReadingQueue>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            worker_id,
            processor,
            queue,
            cancel_token,
        }
    }

    /// Run until cancelled or the queue closes.
    pub async fn run(self) -> WorkerExit {
        let worker = self.worker_id;
        debug!(worker, queue = self.queue.queue_name(), "Worker started");

        loop {
            let event = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!(worker, "Shutdown signal received");
                    return WorkerExit::Cancelled;
                }
                result = self.queue.receive() => result,
            };

            match event {
                Ok(QueueEvent::Delivery(delivery)) => self.handle(delivery).await,
                Ok(QueueEvent::Closed) => {
                    debug!(worker, "Queue closed");
                    return WorkerExit::QueueClosed;
                }
                Err(e) => {
                    warn!(worker, queue = self.queue.queue_name(), error = %e, "Queue receive failed");
                    tokio::select! {
                        _ = self.cancel_token.cancelled() => return WorkerExit::Cancelled,
                        _ = tokio::time::sleep(Duration::from_millis(QUEUE_ERROR_BACKOFF_MS)) => {}
                    }
                }
            }
        }
    }

    async fn handle(&self, delivery: Delivery) {
        let outcome = self.processor.process(&delivery.payload).await;
        if let Outcome::Persisted { report, .. } = &outcome {
            if !report.fully_persisted() {
                warn!(
                    worker = self.worker_id,
                    delivery = %delivery.id,
                    "Acknowledging reading with a failed sink write"
                );
            }
        }

        // Discarded readings are acknowledged too, so poison messages leave the queue
        match self.queue.ack(&delivery.id).await {
            Ok(()) => {
                let acked = self.processor.stats().record_acked();
                trace!(
                    delivery = %delivery.id,
                    from = ?outcome.state(),
                    state = ?ReadingState::Acknowledged
                );
                if acked % PROGRESS_LOG_EVERY == 0 {
                    info!("{}", self.processor.stats().snapshot());
                }
            }
            Err(e) => {
                warn!(
                    worker = self.worker_id,
                    delivery = %delivery.id,
                    error = %e,
                    "Ack failed, message may be redelivered"
                );
            }
        }
    }
}
