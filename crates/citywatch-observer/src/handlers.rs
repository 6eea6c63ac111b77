//! REST API endpoint handlers for the Observer server.
//!
//! Read handlers serve the engine's latest frame through the shared
//! [`Dashboard`](citywatch_core::engine::Dashboard). They never block on
//! the engine loop.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/health` | Status, version, slot flags |
//! | `GET` | `/api/snapshot` | Raw snapshot |
//! | `GET` | `/api/stats` | Headline counters |
//! | `GET` | `/api/alerts` | Alerts, most severe first |
//! | `GET` | `/api/map/markers` | One marker per operation |
//! | `GET` | `/api/traffic/trend` | Next-hour traffic outlook |
//! | `GET` | `/api/traffic/overview` | Latest sample per location |
//! | `GET` | `/api/traffic/series` | Chart points |
//! | `GET` | `/api/metrics/gauges` | System gauges |
//! | `GET` | `/api/predictions` | Cached prediction set |
//! | `POST` | `/api/predictions/refresh` | Run the external analysis |
//! | `POST` | `/api/channels/{channel}` | Publish a channel payload |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use citywatch_core::prediction::RefreshOutcome;
use citywatch_core::validate::decode_payload;
use citywatch_types::Channel;
use tracing::{debug, info};

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

/// Liveness plus a summary of what the engine has seen so far.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.dashboard.snapshot();
    let channels: serde_json::Map<String, serde_json::Value> = Channel::ALL
        .into_iter()
        .map(|c| (c.name().to_owned(), serde_json::Value::Bool(snapshot.is_set(c))))
        .collect();
    let uptime_seconds = Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds()
        .max(0);

    Json(serde_json::json!({
        "status": "ok",
        "version": snapshot.version,
        "updated_at": snapshot.updated_at,
        "channels": channels,
        "predictions_available": state.dashboard.predictions().is_some(),
        "uptime_seconds": uptime_seconds,
    }))
}

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

/// The raw snapshot. Unset slots serialize as `null`.
pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let snapshot = state.dashboard.snapshot();
    let body = serde_json::to_value(snapshot.as_ref())?;
    Ok(Json(body))
}

/// Headline counters.
pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.dashboard.stats())
}

/// Alerts, most severe first.
pub async fn get_alerts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let alerts = state.dashboard.alerts();
    Json(serde_json::json!({
        "count": alerts.len(),
        "alerts": alerts,
    }))
}

/// Map markers, one per live operation.
pub async fn get_map_markers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.dashboard.map_markers())
}

/// Next-hour traffic outlook.
pub async fn get_traffic_trend(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.dashboard.traffic_trend())
}

/// Latest traffic sample per location.
pub async fn get_traffic_overview(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.dashboard.traffic_overview())
}

/// Traffic series as chart points.
pub async fn get_traffic_series(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.dashboard.traffic_series())
}

/// System metric gauges.
pub async fn get_metric_gauges(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.dashboard.metric_gauges())
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

/// The cached prediction set, or `available: false` before the first
/// successful refresh.
pub async fn get_predictions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let current = state.dashboard.predictions();
    Json(serde_json::json!({
        "available": current.is_some(),
        "predictions": current.as_deref(),
    }))
}

/// Run the external analysis and report whether its result was committed.
///
/// A superseded refresh still answers 200 with whatever set is current.
pub async fn refresh_predictions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let outcome = state.dashboard.request_prediction_refresh().await?;
    let body = match outcome {
        RefreshOutcome::Committed(set) => serde_json::json!({
            "outcome": "committed",
            "predictions": set.as_ref(),
        }),
        RefreshOutcome::Superseded => serde_json::json!({
            "outcome": "superseded",
            "predictions": state.dashboard.predictions().as_deref(),
        }),
    };
    Ok(Json(body))
}

// ---------------------------------------------------------------------------
// POST /api/channels/{channel}
// ---------------------------------------------------------------------------

/// Validate a JSON payload for `channel` and publish it on the adapter.
///
/// Accepts either the channel name (`traffic`) or its event name
/// (`traffic_update`). Answers 202 once the payload is queued for the
/// engine; read endpoints reflect it after the next recomputation. A full
/// engine queue refuses the payload and answers 503.
pub async fn publish(
    State(state): State<Arc<AppState>>,
    Path(channel_name): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ObserverError> {
    let channel = Channel::from_name(&channel_name)
        .ok_or_else(|| ObserverError::NotFound(format!("channel {channel_name}")))?;

    let payload = decode_payload(channel, body).inspect_err(|e| {
        debug!(%channel, error = %e, "Rejected published payload");
    })?;

    let delivered = state.adapter.publish(payload)?;
    info!(%channel, delivered, "Payload published");

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "channel": channel,
            "event": channel.event_name(),
            "delivered": delivered,
        })),
    ))
}
