//! Shared application state for the Observer API server.
//!
//! [`AppState`] holds the core [`Dashboard`] that every read endpoint
//! serves from, and the in-process channel adapter the publish bridge
//! delivers to.

use chrono::{DateTime, Utc};
use citywatch_core::channel::LocalChannelAdapter;
use citywatch_core::engine::Dashboard;

/// Shared state for the Observer API server.
///
/// Wrapped in `Arc` and passed to all Axum handlers via
/// [`axum::extract::State`].
#[derive(Debug, Clone)]
pub struct AppState {
    /// Read handle over the engine and prediction cache.
    pub dashboard: Dashboard,
    /// Adapter the publish bridge delivers payloads on.
    pub adapter: LocalChannelAdapter,
    /// When the server state was created.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state over a running engine and its adapter.
    pub fn new(dashboard: Dashboard, adapter: LocalChannelAdapter) -> Self {
        Self {
            dashboard,
            adapter,
            started_at: Utc::now(),
        }
    }
}
