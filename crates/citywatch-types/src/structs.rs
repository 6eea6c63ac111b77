//! Channel payloads and prediction records.
//!
//! These are the values the upstream feeds deliver. Field names are
//! camel-cased on the wire to match the dashboard feed format.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{Channel, Impact, OperationType, PredictionDomain};
use crate::ids::OperationId;

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// A live city operation as reported by the operations feed.
///
/// Immutable once received. The whole set is superseded by the next
/// `operations_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct OperationEvent {
    /// Identifier, unique within one operations payload.
    pub id: OperationId,
    /// The service this operation belongs to.
    pub operation_type: OperationType,
    /// Human-readable place name.
    pub location: String,
    /// Severity from 1 (routine) to 5 (major).
    pub severity: u8,
    /// WGS84 latitude in degrees.
    pub latitude: f64,
    /// WGS84 longitude in degrees.
    pub longitude: f64,
    /// Free-text description.
    pub description: String,
    /// When the operation was reported.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Traffic
// ---------------------------------------------------------------------------

/// One traffic measurement at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct TrafficSample {
    /// Road segment or intersection name.
    pub location: String,
    /// Congestion from 0 (free flow) to 10 (gridlock).
    pub congestion_level: u8,
    /// Vehicles counted in the sampling interval.
    pub vehicle_count: u32,
    /// Mean vehicle speed in km/h.
    pub average_speed: f64,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// System metrics
// ---------------------------------------------------------------------------

/// Flat set of platform gauges, fully replaced on every `system_metrics`
/// event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    /// CPU utilisation percentage (0-100).
    pub cpu: f64,
    /// Memory utilisation percentage (0-100).
    pub memory: f64,
    /// Storage utilisation percentage (0-100).
    pub storage: f64,
    /// Network throughput in Mbps.
    pub network: f64,
    /// Number of connected clients and devices.
    pub active_connections: u64,
    /// Pre-formatted throughput label (e.g. `2.4 GB/s`).
    pub data_throughput_label: String,
    /// Any further numeric gauges the feed reports, keyed by their
    /// top-level field name.
    #[serde(flatten)]
    pub gauges: BTreeMap<String, f64>,
}

// ---------------------------------------------------------------------------
// IoT
// ---------------------------------------------------------------------------

/// Opaque sensor/device payload. Only the latest one is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(transparent)]
pub struct IotEvent(pub serde_json::Value);

impl IotEvent {
    /// Number of entries in the payload's `devices` array, if it has one.
    pub fn device_count(&self) -> usize {
        self.0
            .get("devices")
            .and_then(serde_json::Value::as_array)
            .map_or(0, Vec::len)
    }
}

// ---------------------------------------------------------------------------
// Channel payloads
// ---------------------------------------------------------------------------

/// A typed payload delivered on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "channel", content = "data", rename_all = "lowercase")]
pub enum ChannelPayload {
    /// Full replacement of the live operations set.
    Operations(Vec<OperationEvent>),
    /// New traffic samples to append to the series.
    Traffic(Vec<TrafficSample>),
    /// Full replacement of the system gauges.
    Metrics(SystemMetrics),
    /// Latest device telemetry.
    Iot(IotEvent),
}

impl ChannelPayload {
    /// The channel this payload belongs to.
    pub const fn channel(&self) -> Channel {
        match self {
            Self::Operations(_) => Channel::Operations,
            Self::Traffic(_) => Channel::Traffic,
            Self::Metrics(_) => Channel::Metrics,
            Self::Iot(_) => Channel::Iot,
        }
    }

    /// Decode the bare JSON body of a channel event.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the body does not match the
    /// channel's payload shape.
    pub fn from_json(channel: Channel, body: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match channel {
            Channel::Operations => Self::Operations(serde_json::from_value(body)?),
            Channel::Traffic => Self::Traffic(serde_json::from_value(body)?),
            Channel::Metrics => Self::Metrics(serde_json::from_value(body)?),
            Channel::Iot => Self::Iot(IotEvent(body)),
        })
    }
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

/// One externally computed forecast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    /// Which domain this forecast covers.
    pub domain: PredictionDomain,
    /// Forecast text.
    pub prediction_text: String,
    /// Confidence percentage (0-100).
    pub confidence: u8,
    /// Expected impact.
    pub impact: Impact,
    /// Suggested operator response.
    pub recommendation: String,
}

/// The four domain forecasts of one completed analysis, replaced as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct PredictionSet {
    /// Traffic forecast.
    pub traffic: PredictionRecord,
    /// Security forecast.
    pub security: PredictionRecord,
    /// Utilities forecast.
    pub utilities: PredictionRecord,
    /// Emergency services forecast.
    pub emergency: PredictionRecord,
    /// When the analysis completed.
    pub generated_at: DateTime<Utc>,
}

impl PredictionSet {
    /// The records paired with the domain slot they occupy.
    pub const fn records(&self) -> [(PredictionDomain, &PredictionRecord); 4] {
        [
            (PredictionDomain::Traffic, &self.traffic),
            (PredictionDomain::Security, &self.security),
            (PredictionDomain::Utilities, &self.utilities),
            (PredictionDomain::Emergency, &self.emergency),
        ]
    }
}
