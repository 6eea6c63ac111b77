//! Shared type definitions for the Citywatch operations picture.
//!
//! This crate is the single source of truth for the data model used across
//! the workspace. Types flow to `TypeScript` via `ts-rs` for the dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers
//! - [`enums`] -- Channels, operation types, severity bands, prediction enums
//! - [`structs`] -- Channel payloads and prediction records
//! - [`views`] -- Derived, display-ready values

pub mod enums;
pub mod ids;
pub mod structs;
pub mod views;

// Re-export all public types at crate root for convenience.
pub use enums::{
    AlertLevel, Channel, CongestionBand, Impact, OperationType, PredictionDomain, SeverityBand,
    TrendDirection,
};
pub use ids::{OperationId, SubscriptionId};
pub use structs::{
    ChannelPayload, IotEvent, OperationEvent, PredictionRecord, PredictionSet, SystemMetrics,
    TrafficSample,
};
pub use views::{
    Alert, AlertSource, DashboardStats, MapMarker, MetricGauge, TrafficChartPoint,
    TrafficOverviewEntry, TrafficTrend,
};
