//! Pipeline Coordinator: N interchangeable workers over one shared queue
//!
//! Workers share the stores, the breakpoint tables and the stats counters
//! through `Arc`s. Each worker gets its own instance of the prediction model,
//! loaded once at construction.

use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::processing_loop::{ProcessingLoop, WorkerExit};
use super::processor::ReadingProcessor;
use super::stats::{PipelineStats, StatsSnapshot};
use crate::aqi::BreakpointError;
use crate::config::PipelineConfig;
use crate::model::{load_predictor, ModelError};
use crate::source::ReadingQueue;
use crate::storage::Stores;

/// Startup failures. Everything after startup is handled per reading.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid breakpoint table: {0}")]
    Breakpoints(#[from] BreakpointError),
    #[error("failed to load prediction model: {0}")]
    Model(#[from] ModelError),
}

pub struct PipelineCoordinator {
    workers: Vec<ReadingProcessor>,
    queue: Arc<dyn ReadingQueue>,
    stats: Arc<PipelineStats>,
}

impl PipelineCoordinator {
    pub fn new(
        config: &PipelineConfig,
        stores: &Stores,
        queue: Arc<dyn ReadingQueue>,
        stats: Arc<PipelineStats>,
    ) -> Result<Self, PipelineError> {
        let base = ReadingProcessor::from_config(config, stores, stats.clone())?;
        let worker_count = config.pipeline.workers.max(1);

        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            workers.push(base.clone().with_predictor(load_predictor(&config.model)?));
        }

        info!(
            workers = worker_count,
            queue = queue.queue_name(),
            current = stores.current.backend_name(),
            analytical = stores.analytical.backend_name(),
            weather = stores.weather.backend_name(),
            model = config.model.path.is_some(),
            "Pipeline coordinator ready"
        );

        Ok(Self {
            workers,
            queue,
            stats,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Run every worker until cancellation or until the queue closes.
    pub async fn run(self, cancel_token: CancellationToken) -> StatsSnapshot {
        let mut tasks = JoinSet::new();
        for (worker_id, processor) in self.workers.into_iter().enumerate() {
            let worker = ProcessingLoop::new(
                worker_id,
                processor,
                self.queue.clone(),
                cancel_token.clone(),
            );
            tasks.spawn(worker.run());
        }

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(WorkerExit::Cancelled | WorkerExit::QueueClosed) => {}
                Err(e) => error!(error = %e, "Worker task failed"),
            }
        }

        let snapshot = self.stats.snapshot();
        info!("{snapshot}");
        snapshot
    }
}
