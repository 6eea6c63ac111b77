//! Axum router construction for the Observer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the Observer server.
///
/// The router includes:
/// - `GET /ws/views` -- `WebSocket` stream of `{version, stats}`
/// - `GET /api/health` -- status and slot flags
/// - `GET /api/snapshot` -- raw snapshot
/// - `GET /api/stats`, `/api/alerts`, `/api/map/markers` -- derived views
/// - `GET /api/traffic/{trend,overview,series}` -- traffic views
/// - `GET /api/metrics/gauges` -- system gauges
/// - `GET /api/predictions` -- cached prediction set
/// - `POST /api/predictions/refresh` -- run the external analysis
/// - `POST /api/channels/{channel}` -- publish a channel payload
///
/// CORS is configured to allow any origin for development. In
/// production this should be restricted.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // WebSocket
        .route("/ws/views", get(ws::ws_views))
        // REST API
        .route("/api/health", get(handlers::health))
        .route("/api/snapshot", get(handlers::get_snapshot))
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/alerts", get(handlers::get_alerts))
        .route("/api/map/markers", get(handlers::get_map_markers))
        .route("/api/traffic/trend", get(handlers::get_traffic_trend))
        .route("/api/traffic/overview", get(handlers::get_traffic_overview))
        .route("/api/traffic/series", get(handlers::get_traffic_series))
        .route("/api/metrics/gauges", get(handlers::get_metric_gauges))
        .route("/api/predictions", get(handlers::get_predictions))
        .route("/api/predictions/refresh", post(handlers::refresh_predictions))
        // Publish bridge
        .route("/api/channels/{channel}", post(handlers::publish))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
