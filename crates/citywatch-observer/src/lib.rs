//! Observer API server for the Citywatch dashboard.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **REST endpoints** for every derived view (stats, alerts, map
//!   markers, traffic trend/overview/series, metric gauges), the raw
//!   snapshot, and cached predictions
//! - **Prediction refresh** (`POST /api/predictions/refresh`)
//! - **Publish bridge** (`POST /api/channels/{channel}`) that validates a
//!   JSON payload and delivers it on the in-process channel adapter
//! - **`WebSocket` endpoint** (`/ws/views`) pushing `{version, stats}` on
//!   every recomputation
//!
//! # Architecture
//!
//! All reads go through the core [`Dashboard`] handle, which serves the
//! engine's latest immutable frame. Handlers never wait on the engine loop.
//!
//! [`Dashboard`]: citywatch_core::engine::Dashboard

pub mod error;
pub mod handlers;
pub mod router;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use startup::{RunningObserver, StartupError, spawn_observer};
pub use state::AppState;
