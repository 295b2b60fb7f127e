//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the read endpoints using `tower::ServiceExt::oneshot()`.
//! No binary spawn, no network port.

use aqi_pipeline::api::{create_app, ApiState};
use aqi_pipeline::config::PipelineConfig;
use aqi_pipeline::pipeline::{PipelineStats, ReadingProcessor};
use aqi_pipeline::storage::Stores;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tower::ServiceExt;

fn reading(location: &str, hour: u32, pm2_5: f64) -> String {
    format!(
        r#"{{"location_id":"{location}","observed_at":"2024-05-01 {hour:02}:00:00","pm2_5":{pm2_5},"pm10":80.0}}"#
    )
}

/// Stores populated by running readings through a real processor.
async fn create_test_state(readings: &[String]) -> ApiState {
    let stores = Stores::in_memory();
    let stats = Arc::new(PipelineStats::new());
    let processor = ReadingProcessor::from_config(&PipelineConfig::default(), &stores, stats.clone()).unwrap();
    for r in readings {
        processor.process(r.as_bytes()).await;
    }
    ApiState::new(&stores, stats, "epa-2012-full")
}

async fn get(state: ApiState, uri: &str) -> (StatusCode, serde_json::Value) {
    let resp = create_app(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_get_endpoints_return_200() {
    let state = create_test_state(&[reading("bojongsoang", 10, 40.0)]).await;
    let endpoints = [
        "/health",
        "/api/v1/stats",
        "/api/v1/aqi/current",
        "/api/v1/aqi/current/bojongsoang",
        "/api/v1/aqi/history/bojongsoang",
    ];

    for endpoint in &endpoints {
        let (status, json) = get(state.clone(), endpoint).await;
        assert_eq!(status, StatusCode::OK, "GET {endpoint}");
        assert!(json["data"].is_object() || json["data"].is_array(), "GET {endpoint}: {json}");
        assert_eq!(json["meta"]["version"], "1");
    }
}

#[tokio::test]
async fn test_health_reports_table_and_backends() {
    let (_, json) = get(create_test_state(&[]).await, "/health").await;
    assert_eq!(json["data"]["status"], "ok");
    assert_eq!(json["data"]["table_version"], "epa-2012-full");
    assert_eq!(json["data"]["current_backend"], "memory");
}

#[tokio::test]
async fn test_stats_counts_processed_readings() {
    let state = create_test_state(&[
        reading("bojongsoang", 10, 40.0),
        "not json".to_string(),
    ])
    .await;
    let (_, json) = get(state, "/api/v1/stats").await;
    assert_eq!(json["data"]["received"], 2);
    assert_eq!(json["data"]["scored"], 1);
    assert_eq!(json["data"]["decode_errors"], 1);
    assert_eq!(json["data"]["discarded"], 1);
}

#[tokio::test]
async fn test_current_document_for_location() {
    let state = create_test_state(&[reading("bojongsoang", 10, 40.0)]).await;
    let (status, json) = get(state, "/api/v1/aqi/current/bojongsoang").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["overall_index"], 112);
    assert_eq!(json["data"]["dominant_pollutant"], "pm2_5");
    assert_eq!(json["data"]["table_version"], "epa-2012-full");
}

#[tokio::test]
async fn test_current_lists_every_location() {
    let state = create_test_state(&[reading("a", 10, 5.0), reading("b", 10, 40.0)]).await;
    let (_, json) = get(state, "/api/v1/aqi/current").await;
    let ids: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["location_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn test_unknown_location_returns_404() {
    let (status, json) = get(create_test_state(&[]).await, "/api/v1/aqi/current/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
    assert!(json["error"]["message"].as_str().unwrap().contains("nowhere"));
}

#[tokio::test]
async fn test_history_is_newest_first_and_limited() {
    let state = create_test_state(&[
        reading("bojongsoang", 8, 10.0),
        reading("bojongsoang", 10, 40.0),
        reading("bojongsoang", 9, 20.0),
    ])
    .await;

    let (_, json) = get(state.clone(), "/api/v1/aqi/history/bojongsoang").await;
    assert_eq!(json["data"].as_array().unwrap().len(), 3);

    let (status, json) = get(state, "/api/v1/aqi/history/bojongsoang?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    let rows = json["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["pm2_5"], 40.0);
}

#[tokio::test]
async fn test_history_zero_limit_is_bad_request() {
    let (status, json) = get(create_test_state(&[]).await, "/api/v1/aqi/history/bojongsoang?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let resp = create_app(create_test_state(&[]).await)
        .oneshot(Request::builder().uri("/api/v2/anything").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
