//! Payload validation run before anything is merged into the store.
//!
//! Each check returns `Ok(())` on success or a [`ValidationError`] naming
//! the first offending value. Out-of-range values are rejected, never
//! clamped, so upstream bugs surface instead of being hidden.

use std::collections::BTreeSet;

use citywatch_types::{
    Channel, ChannelPayload, OperationEvent, OperationId, SystemMetrics, TrafficSample,
};

/// Lowest valid operation severity.
pub const MIN_SEVERITY: u8 = 1;

/// Highest valid operation severity.
pub const MAX_SEVERITY: u8 = 5;

/// Highest valid congestion level (the scale starts at 0).
pub const MAX_CONGESTION: u8 = 10;

/// Reasons a channel payload is refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// An operation severity is outside 1-5.
    #[error("operation {id}: severity {severity} is outside {MIN_SEVERITY}-{MAX_SEVERITY}")]
    SeverityOutOfRange {
        /// The offending operation.
        id: OperationId,
        /// The rejected value.
        severity: u8,
    },

    /// Two operations in one payload share an ID.
    #[error("operation {id} appears more than once")]
    DuplicateOperation {
        /// The repeated identifier.
        id: OperationId,
    },

    /// Latitude or longitude is not a finite WGS84 coordinate.
    #[error("operation {id}: invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates {
        /// The offending operation.
        id: OperationId,
        /// Reported latitude.
        latitude: f64,
        /// Reported longitude.
        longitude: f64,
    },

    /// A traffic congestion level is above 10.
    #[error("traffic sample at {location}: congestion {level} is outside 0-{MAX_CONGESTION}")]
    CongestionOutOfRange {
        /// Sample location.
        location: String,
        /// The rejected value.
        level: u8,
    },

    /// A traffic average speed is negative or not finite.
    #[error("traffic sample at {location}: invalid average speed {speed}")]
    InvalidSpeed {
        /// Sample location.
        location: String,
        /// The rejected value.
        speed: f64,
    },

    /// A system gauge is outside its range or not finite.
    #[error("metric {name}: value {value} is outside its range")]
    GaugeOutOfRange {
        /// Gauge name.
        name: String,
        /// The rejected value.
        value: f64,
    },

    /// The payload body did not match the channel's shape.
    #[error("malformed {channel} payload: {reason}")]
    Malformed {
        /// Channel the body was sent on.
        channel: Channel,
        /// Decoder message.
        reason: String,
    },
}

/// Validate a payload for its channel.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate_payload(payload: &ChannelPayload) -> Result<(), ValidationError> {
    match payload {
        ChannelPayload::Operations(ops) => validate_operations(ops),
        ChannelPayload::Traffic(samples) => validate_traffic(samples),
        ChannelPayload::Metrics(metrics) => validate_metrics(metrics),
        // IoT payloads are opaque.
        ChannelPayload::Iot(_) => Ok(()),
    }
}

/// Decode a JSON body for a channel and validate it.
///
/// # Errors
///
/// Returns [`ValidationError::Malformed`] when the body does not decode, or
/// the first range violation otherwise.
pub fn decode_payload(
    channel: Channel,
    body: serde_json::Value,
) -> Result<ChannelPayload, ValidationError> {
    let payload =
        ChannelPayload::from_json(channel, body).map_err(|e| ValidationError::Malformed {
            channel,
            reason: e.to_string(),
        })?;
    validate_payload(&payload)?;
    Ok(payload)
}

fn validate_operations(ops: &[OperationEvent]) -> Result<(), ValidationError> {
    let mut seen = BTreeSet::new();
    for op in ops {
        if !(MIN_SEVERITY..=MAX_SEVERITY).contains(&op.severity) {
            return Err(ValidationError::SeverityOutOfRange {
                id: op.id.clone(),
                severity: op.severity,
            });
        }
        if !seen.insert(&op.id) {
            return Err(ValidationError::DuplicateOperation { id: op.id.clone() });
        }
        let lat_ok = op.latitude.is_finite() && (-90.0..=90.0).contains(&op.latitude);
        let lon_ok = op.longitude.is_finite() && (-180.0..=180.0).contains(&op.longitude);
        if !lat_ok || !lon_ok {
            return Err(ValidationError::InvalidCoordinates {
                id: op.id.clone(),
                latitude: op.latitude,
                longitude: op.longitude,
            });
        }
    }
    Ok(())
}

fn validate_traffic(samples: &[TrafficSample]) -> Result<(), ValidationError> {
    for sample in samples {
        if sample.congestion_level > MAX_CONGESTION {
            return Err(ValidationError::CongestionOutOfRange {
                location: sample.location.clone(),
                level: sample.congestion_level,
            });
        }
        if !sample.average_speed.is_finite() || sample.average_speed < 0.0 {
            return Err(ValidationError::InvalidSpeed {
                location: sample.location.clone(),
                speed: sample.average_speed,
            });
        }
    }
    Ok(())
}

fn validate_metrics(metrics: &SystemMetrics) -> Result<(), ValidationError> {
    let percentages = [
        ("cpu", metrics.cpu),
        ("memory", metrics.memory),
        ("storage", metrics.storage),
    ];
    for (name, value) in percentages {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(ValidationError::GaugeOutOfRange {
                name: name.to_owned(),
                value,
            });
        }
    }
    if !metrics.network.is_finite() || metrics.network < 0.0 {
        return Err(ValidationError::GaugeOutOfRange {
            name: "network".to_owned(),
            value: metrics.network,
        });
    }
    for (name, value) in &metrics.gauges {
        if !value.is_finite() {
            return Err(ValidationError::GaugeOutOfRange {
                name: name.clone(),
                value: *value,
            });
        }
    }
    Ok(())
}
