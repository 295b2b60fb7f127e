//! API route definitions
//!
//! - `/health`
//! - `/api/v1/stats`
//! - `/api/v1/aqi/current`
//! - `/api/v1/aqi/current/:location_id`
//! - `/api/v1/aqi/history/:location_id?limit=N`

use axum::routing::get;
use axum::Router;

use super::handlers::{self, ApiState};

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/stats", get(handlers::stats))
        .route("/aqi/current", get(handlers::current_all))
        .route("/aqi/current/:location_id", get(handlers::current_one))
        .route("/aqi/history/:location_id", get(handlers::history))
        .with_state(state)
}

pub fn health_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .with_state(state)
}
