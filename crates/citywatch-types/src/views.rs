//! Derived, display-ready values.
//!
//! Nothing in this module is stored: every value is recomputed from a
//! snapshot by the derivation functions in `citywatch-core`. The types live
//! here so the dashboard gets `TypeScript` bindings for them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{AlertLevel, CongestionBand, OperationType, SeverityBand, TrendDirection};
use crate::ids::OperationId;

/// Headline figures for the dashboard cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Number of live operations.
    pub active_operations_count: u32,
    /// Traffic samples in the series with congestion above 7.
    pub traffic_incident_count: u32,
    /// Security operations with severity above 3.
    pub security_alert_count: u32,
    /// Share of utility operations below the critical band (0-100).
    pub utility_status_percent: u8,
    /// Operations with severity 4 or above, any type.
    pub critical_operations_count: u32,
    /// Live operations per type (every type present, zero when absent).
    pub operations_by_type: BTreeMap<OperationType, u32>,
    /// Devices listed in the latest IoT payload.
    pub active_devices: u32,
}

/// Where a derived alert came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AlertSource {
    /// A live operation.
    #[serde(rename_all = "camelCase")]
    Operation {
        /// The operation's identifier.
        id: OperationId,
        /// The operation's service.
        operation_type: OperationType,
    },
    /// A congested traffic sample.
    #[serde(rename_all = "camelCase")]
    Traffic {
        /// Congestion level of the sample (0-10).
        congestion_level: u8,
    },
}

/// An alert derived from the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// What raised the alert.
    pub source: AlertSource,
    /// Alert class.
    pub level: AlertLevel,
    /// Severity on the 1-5 operation scale.
    pub severity: u8,
    /// Place the alert refers to.
    pub location: String,
    /// Human-readable message.
    pub message: String,
    /// When the underlying event happened.
    pub occurred_at: DateTime<Utc>,
    /// When the snapshot this alert was derived from last changed.
    pub derived_at: DateTime<Utc>,
}

/// A map marker for one live operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct MapMarker {
    /// The operation's identifier.
    pub id: OperationId,
    /// The operation's service.
    pub operation_type: OperationType,
    /// Place name.
    pub location: String,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
    /// Raw severity (1-5).
    pub severity: u8,
    /// Color classification.
    pub band: SeverityBand,
    /// Popup text.
    pub description: String,
}

/// Short-term traffic projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct TrafficTrend {
    /// Projected congestion for the next hour (0-10).
    pub next_hour_estimate: u8,
    /// Direction of change.
    pub trend: TrendDirection,
    /// Confidence percentage (0-100).
    pub confidence: u8,
}

/// Latest reading for one traffic location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct TrafficOverviewEntry {
    /// Road segment or intersection name.
    pub location: String,
    /// Latest congestion level.
    pub congestion_level: u8,
    /// Congestion band.
    pub band: CongestionBand,
    /// Latest mean speed in km/h.
    pub average_speed: f64,
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
}

/// One point of the traffic chart series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct TrafficChartPoint {
    /// Axis label (`HH:MM`, UTC).
    pub time: String,
    /// Congestion level.
    pub congestion: u8,
    /// Vehicle count.
    pub vehicles: u32,
    /// Mean speed in km/h.
    pub speed: f64,
}

/// One gauge on the system health panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct MetricGauge {
    /// Gauge name (`cpu`, `memory`, ...).
    pub name: String,
    /// Current value.
    pub value: f64,
    /// Unit label.
    pub unit: String,
    /// Health classification, if the gauge has thresholds.
    pub band: Option<SeverityBand>,
}
