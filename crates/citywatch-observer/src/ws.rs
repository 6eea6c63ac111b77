//! `WebSocket` handler for real-time view streaming.
//!
//! Clients connect to `GET /ws/views` and receive a JSON-encoded
//! [`ViewUpdate`] immediately and then each time the engine publishes a
//! new frame. The handler watches the engine's frame channel, so a slow
//! client skips intermediate versions and resumes from the newest one.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use citywatch_core::engine::Frame;
use citywatch_types::DashboardStats;
use serde::Serialize;
use tracing::{debug, warn};

use crate::state::AppState;

/// Message pushed to `WebSocket` clients after each recomputation.
#[derive(Debug, Clone, Serialize)]
pub struct ViewUpdate {
    /// Snapshot version the stats were derived from.
    pub version: u64,
    /// Headline counters at that version.
    pub stats: DashboardStats,
}

impl From<&Frame> for ViewUpdate {
    fn from(frame: &Frame) -> Self {
        Self {
            version: frame.version(),
            stats: frame.views.stats.clone(),
        }
    }
}

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming view updates.
///
/// # Route
///
/// `GET /ws/views`
pub async fn ws_views(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

async fn send_update(socket: &mut WebSocket, update: &ViewUpdate) -> bool {
    let json = match serde_json::to_string(update) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize view update: {e}");
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

/// Handle the `WebSocket` lifecycle: send the current frame, then forward
/// each new frame as a text message.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("WebSocket client connected");

    let mut frames = state.dashboard.watch();
    let initial = ViewUpdate::from(&*frames.borrow_and_update());
    if !send_update(&mut socket, &initial).await {
        debug!("WebSocket client disconnected (initial send failed)");
        return;
    }

    loop {
        tokio::select! {
            // Wait for the engine to publish a new frame.
            changed = frames.changed() => {
                if changed.is_err() {
                    debug!("Engine stopped, shutting down WebSocket");
                    return;
                }
                let update = ViewUpdate::from(&*frames.borrow_and_update());
                if !send_update(&mut socket, &update).await {
                    debug!("WebSocket client disconnected (send failed)");
                    return;
                }
            }
            // Check if the client sent a close frame or disconnected.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    _ => {
                        // Ignore other message types (text, binary from client).
                    }
                }
            }
        }
    }
}
