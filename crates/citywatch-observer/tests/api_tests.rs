//! Integration tests for the Observer API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Each test runs a real engine task behind the
//! dashboard and publishes through the in-process adapter.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use citywatch_core::channel::LocalChannelAdapter;
use citywatch_core::config::CitywatchConfig;
use citywatch_core::engine::{Dashboard, Engine, spawn_engine};
use citywatch_core::prediction::{PredictionCache, PredictionError, PredictionSource};
use citywatch_observer::router::build_router;
use citywatch_observer::state::AppState;
use citywatch_types::{Impact, PredictionDomain, PredictionRecord, PredictionSet};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Prediction source that always returns the same answer.
struct FixedSource(Result<PredictionSet, PredictionError>);

impl PredictionSource for FixedSource {
    async fn fetch(&self) -> Result<PredictionSet, PredictionError> {
        self.0.clone()
    }
}

fn record(domain: PredictionDomain) -> PredictionRecord {
    PredictionRecord {
        domain,
        prediction_text: String::from("Rush hour congestion expected on Highway I-95"),
        confidence: 87,
        impact: Impact::High,
        recommendation: String::from("Activate alternate route signage"),
    }
}

fn prediction_set() -> PredictionSet {
    PredictionSet {
        traffic: record(PredictionDomain::Traffic),
        security: record(PredictionDomain::Security),
        utilities: record(PredictionDomain::Utilities),
        emergency: record(PredictionDomain::Emergency),
        generated_at: Utc.with_ymd_and_hms(2026, 10, 18, 7, 30, 0).unwrap(),
    }
}

fn make_state(source: FixedSource) -> Arc<AppState> {
    let (dashboard, _task) = spawn_engine(&CitywatchConfig::default(), source);
    let adapter = LocalChannelAdapter::new();
    for sub in dashboard.engine().attach(&adapter).unwrap() {
        sub.detach();
    }
    Arc::new(AppState::new(dashboard, adapter))
}

fn default_state() -> Arc<AppState> {
    make_state(FixedSource(Ok(prediction_set())))
}

async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let app = build_router(Arc::clone(state));
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post(state: &Arc<AppState>, uri: &str, body: &Value) -> (StatusCode, Value) {
    let app = build_router(Arc::clone(state));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn wait_for_version(state: &Arc<AppState>, version: u64) {
    let mut frames = state.dashboard.watch();
    frames.wait_for(|f| f.version() >= version).await.unwrap();
}

fn operation(kind: &str, severity: u8, minute: u32) -> Value {
    json!({
        "id": uuid_for(minute),
        "operationType": kind,
        "location": "Central Station",
        "severity": severity,
        "latitude": 40.7527,
        "longitude": -73.9772,
        "description": "Unusual activity detected",
        "timestamp": format!("2026-10-18T08:{minute:02}:00Z"),
    })
}

fn uuid_for(n: u32) -> String {
    format!("00000000-0000-7000-8000-{n:012}")
}

// ---------------------------------------------------------------------------
// Reads on an empty engine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_unset_slots() {
    let state = default_state();
    let (status, body) = get(&state, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], 0);
    for channel in ["operations", "traffic", "metrics", "iot"] {
        assert_eq!(body["channels"][channel], false);
    }
    assert_eq!(body["predictions_available"], false);
}

#[tokio::test]
async fn empty_engine_serves_empty_views() {
    let state = default_state();

    let (status, stats) = get(&state, "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["activeOperationsCount"], 0);
    assert_eq!(stats["utilityStatusPercent"], 100);

    let (_, alerts) = get(&state, "/api/alerts").await;
    assert_eq!(alerts["count"], 0);

    let (_, trend) = get(&state, "/api/traffic/trend").await;
    assert_eq!(trend["trend"], "stable");
    assert_eq!(trend["confidence"], 0);

    let (_, gauges) = get(&state, "/api/metrics/gauges").await;
    assert_eq!(gauges, json!([]));

    let (_, snapshot) = get(&state, "/api/snapshot").await;
    assert_eq!(snapshot["operations"], Value::Null);
}

// ---------------------------------------------------------------------------
// Publish bridge
// ---------------------------------------------------------------------------

#[tokio::test]
async fn published_operations_reach_alerts_and_markers() {
    let state = default_state();
    let body = json!([
        operation("TRAFFIC", 2, 1),
        operation("EMERGENCY", 5, 2),
        operation("SECURITY", 3, 3),
        operation("UTILITY", 5, 4),
    ]);
    let (status, ack) = post(&state, "/api/channels/operations", &body).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(ack["delivered"], 1);
    assert_eq!(ack["event"], "operations_update");
    wait_for_version(&state, 1).await;

    let (_, alerts) = get(&state, "/api/alerts").await;
    assert_eq!(alerts["count"], 3);
    let severities: Vec<u64> = alerts["alerts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["severity"].as_u64().unwrap())
        .collect();
    assert_eq!(severities, vec![5, 5, 3]);
    assert_eq!(alerts["alerts"][0]["level"], "CRITICAL");

    let (_, markers) = get(&state, "/api/map/markers").await;
    assert_eq!(markers.as_array().unwrap().len(), 4);

    let (_, stats) = get(&state, "/api/stats").await;
    assert_eq!(stats["criticalOperationsCount"], 2);
    assert_eq!(stats["operationsByType"]["UTILITY"], 1);
}

#[tokio::test]
async fn numeric_operation_ids_are_accepted() {
    let state = default_state();
    let mut first = operation("TRAFFIC", 4, 1);
    first["id"] = json!(1);
    let mut second = operation("SECURITY", 2, 2);
    second["id"] = json!(2);
    let (status, _) = post(&state, "/api/channels/operations", &json!([first, second])).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_for_version(&state, 1).await;

    let (_, markers) = get(&state, "/api/map/markers").await;
    assert_eq!(markers[0]["id"], "1");
    assert_eq!(markers[1]["id"], "2");
}

#[tokio::test]
async fn duplicate_numeric_and_string_ids_are_unprocessable() {
    let state = default_state();
    let mut first = operation("TRAFFIC", 4, 1);
    first["id"] = json!(7);
    let mut second = operation("SECURITY", 2, 2);
    second["id"] = json!("7");
    let (status, _) = post(&state, "/api/channels/operations", &json!([first, second])).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn full_engine_queue_is_service_unavailable() {
    let mut config = CitywatchConfig::default();
    config.engine.queue_capacity = 1;
    // The engine is never run, so the queue is never drained.
    let (_engine, handle, frames) = Engine::new(&config);
    let cache = Arc::new(PredictionCache::new(
        FixedSource(Ok(prediction_set())),
        Duration::from_secs(1),
    ));
    let dashboard = Dashboard::new(handle, frames, cache);
    let adapter = LocalChannelAdapter::new();
    for sub in dashboard.engine().attach(&adapter).unwrap() {
        sub.detach();
    }
    let state = Arc::new(AppState::new(dashboard, adapter));

    let body = json!([operation("UTILITY", 2, 1)]);
    let (status, _) = post(&state, "/api/channels/operations", &body).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, error) = post(&state, "/api/channels/operations", &body).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error["status"], 503);
    assert_eq!(state.dashboard.version(), 0);
}

#[tokio::test]
async fn out_of_range_severity_is_unprocessable() {
    let state = default_state();
    let (status, body) = post(
        &state,
        "/api/channels/operations",
        &json!([operation("SECURITY", 6, 1)]),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], 422);
    assert_eq!(state.dashboard.version(), 0);
}

#[tokio::test]
async fn malformed_body_is_unprocessable() {
    let state = default_state();
    let (status, _) = post(&state, "/api/channels/metrics", &json!({"cpu": "high"})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_channel_is_not_found() {
    let state = default_state();
    let (status, body) = post(&state, "/api/channels/weather", &json!([])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn event_names_are_accepted_for_traffic() {
    let state = default_state();
    let samples: Vec<Value> = [4, 6, 9]
        .iter()
        .enumerate()
        .map(|(i, level)| {
            json!({
                "location": "Downtown Loop",
                "congestionLevel": level,
                "vehicleCount": 320,
                "averageSpeed": 31.0,
                "timestamp": format!("2026-10-18T0{i}:00:00Z"),
            })
        })
        .collect();
    let (status, _) = post(&state, "/api/channels/traffic_update", &Value::Array(samples)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_for_version(&state, 1).await;

    let (_, series) = get(&state, "/api/traffic/series").await;
    assert_eq!(series.as_array().unwrap().len(), 3);
    assert_eq!(series[2]["time"], "02:00");

    let (_, overview) = get(&state, "/api/traffic/overview").await;
    assert_eq!(overview[0]["band"], "heavy");

    let (_, trend) = get(&state, "/api/traffic/trend").await;
    assert_eq!(trend["trend"], "increasing");
}

#[tokio::test]
async fn published_metrics_become_gauges() {
    let state = default_state();
    let metrics = json!({
        "cpu": 95.0,
        "memory": 80.0,
        "storage": 42.0,
        "network": 520.0,
        "activeConnections": 1247,
        "dataThroughputLabel": "2.4 GB/s",
    });
    let (status, _) = post(&state, "/api/channels/metrics", &metrics).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_for_version(&state, 1).await;

    let (_, gauges) = get(&state, "/api/metrics/gauges").await;
    assert_eq!(gauges[0]["name"], "cpu");
    assert_eq!(gauges[0]["band"], "critical");
    assert_eq!(gauges[1]["band"], "warning");
    assert_eq!(gauges[2]["band"], "normal");
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn predictions_unavailable_until_refreshed() {
    let state = default_state();
    let (_, before) = get(&state, "/api/predictions").await;
    assert_eq!(before["available"], false);

    let (status, refreshed) = post(&state, "/api/predictions/refresh", &json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["outcome"], "committed");

    let (_, after) = get(&state, "/api/predictions").await;
    assert_eq!(after["available"], true);
    assert_eq!(after["predictions"]["traffic"]["confidence"], 87);
}

#[tokio::test]
async fn failed_refresh_is_bad_gateway() {
    let state = make_state(FixedSource(Err(PredictionError::Source(String::from(
        "analysis service returned 503",
    )))));
    let (status, body) = post(&state, "/api/predictions/refresh", &json!({})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], 502);

    let (_, current) = get(&state, "/api/predictions").await;
    assert_eq!(current["available"], false);
}
