//! Read API handlers over the current and analytical stores.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::config::defaults::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use crate::pipeline::{PipelineStats, StatsSnapshot};
use crate::storage::{AnalyticalStore, CurrentStore, StorageError, Stores};

/// Shared state for every handler.
#[derive(Clone)]
pub struct ApiState {
    pub current: Arc<dyn CurrentStore>,
    pub analytical: Arc<dyn AnalyticalStore>,
    pub stats: Arc<PipelineStats>,
    pub table_version: String,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(stores: &Stores, stats: Arc<PipelineStats>, table_version: impl Into<String>) -> Self {
        Self {
            current: stores.current.clone(),
            analytical: stores.analytical.clone(),
            stats,
            table_version: table_version.into(),
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub table_version: String,
    pub current_backend: &'static str,
    pub analytical_backend: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    pub discarded: u64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

fn store_error(e: &StorageError) -> Response {
    warn!(error = %e, "Store read failed");
    ApiErrorResponse::service_unavailable(e.to_string())
}

pub async fn health(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        table_version: state.table_version.clone(),
        current_backend: state.current.backend_name(),
        analytical_backend: state.analytical.backend_name(),
    })
}

pub async fn stats(State(state): State<ApiState>) -> Response {
    let counters = state.stats.snapshot();
    ApiResponse::ok(StatsResponse {
        discarded: counters.discarded(),
        counters,
    })
}

pub async fn current_all(State(state): State<ApiState>) -> Response {
    match state.current.list().await {
        Ok(docs) => ApiResponse::ok(docs),
        Err(e) => store_error(&e),
    }
}

pub async fn current_one(State(state): State<ApiState>, Path(location_id): Path<String>) -> Response {
    match state.current.get(&location_id).await {
        Ok(Some(doc)) => ApiResponse::ok(doc),
        Ok(None) => ApiErrorResponse::not_found(format!("no AQI for location '{location_id}'")),
        Err(e) => store_error(&e),
    }
}

pub async fn history(
    State(state): State<ApiState>,
    Path(location_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit == 0 {
        return ApiErrorResponse::bad_request("limit must be at least 1");
    }
    match state
        .analytical
        .history(&location_id, limit.min(MAX_HISTORY_LIMIT))
        .await
    {
        Ok(rows) => ApiResponse::ok(rows),
        Err(e) => store_error(&e),
    }
}
