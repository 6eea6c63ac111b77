//! Enumeration types for the Citywatch operations picture.
//!
//! Wire spellings follow the feeds that produce them: operation types and
//! impact levels are upper-case, channel names and prediction domains are
//! lower-case.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// One independent stream of a specific update kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Active city operations (incidents, dispatches, maintenance).
    Operations,
    /// Traffic congestion time-series.
    Traffic,
    /// Platform system metrics (CPU, memory, throughput).
    Metrics,
    /// Raw sensor and device telemetry.
    Iot,
}

impl Channel {
    /// All channels in slot order.
    pub const ALL: [Self; 4] = [Self::Operations, Self::Traffic, Self::Metrics, Self::Iot];

    /// The channel name used by subscribers (`operations`, `traffic`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Self::Operations => "operations",
            Self::Traffic => "traffic",
            Self::Metrics => "metrics",
            Self::Iot => "iot",
        }
    }

    /// The event name the upstream feed emits for this channel.
    pub const fn event_name(self) -> &'static str {
        match self {
            Self::Operations => "operations_update",
            Self::Traffic => "traffic_update",
            Self::Metrics => "system_metrics",
            Self::Iot => "iot_data",
        }
    }

    /// Resolve a channel from either its channel name or its event name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == name || c.event_name() == name)
    }
}

impl core::fmt::Display for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// The city service an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    /// Road incidents and traffic control.
    Traffic,
    /// Public safety and security patrols.
    Security,
    /// Power, water, and grid operations.
    Utility,
    /// Ambulance, fire, and rescue dispatch.
    Emergency,
}

impl OperationType {
    /// All operation types.
    pub const ALL: [Self; 4] = [Self::Traffic, Self::Security, Self::Utility, Self::Emergency];

    /// Upper-case wire label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Traffic => "TRAFFIC",
            Self::Security => "SECURITY",
            Self::Utility => "UTILITY",
            Self::Emergency => "EMERGENCY",
        }
    }
}

// ---------------------------------------------------------------------------
// Severity bands
// ---------------------------------------------------------------------------

/// Critical/warning/normal classification of a numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum SeverityBand {
    /// Nothing requires attention.
    Normal,
    /// Worth watching.
    Warning,
    /// Immediate attention required.
    Critical,
}

impl SeverityBand {
    /// Classify an operation severity (1-5).
    ///
    /// `>= 4` is critical, `3` is warning, anything lower is normal. Every
    /// value maps to exactly one band.
    pub const fn from_severity(severity: u8) -> Self {
        match severity {
            4.. => Self::Critical,
            3 => Self::Warning,
            _ => Self::Normal,
        }
    }
}

/// Class of a derived alert. Ordered so that `Critical > Warning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    /// Severity exactly 3.
    Warning,
    /// Severity 4 or above.
    Critical,
}

impl AlertLevel {
    /// The alert class for a severity, or `None` when it raises no alert.
    pub const fn from_severity(severity: u8) -> Option<Self> {
        match SeverityBand::from_severity(severity) {
            SeverityBand::Critical => Some(Self::Critical),
            SeverityBand::Warning => Some(Self::Warning),
            SeverityBand::Normal => None,
        }
    }
}

/// Congestion band shown for a road segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum CongestionBand {
    /// Congestion below 6.
    Light,
    /// Congestion 6 or 7.
    Moderate,
    /// Congestion 8 and above.
    Heavy,
}

impl CongestionBand {
    /// Classify a congestion level (0-10).
    pub const fn from_congestion(level: u8) -> Self {
        match level {
            8.. => Self::Heavy,
            6 | 7 => Self::Moderate,
            _ => Self::Light,
        }
    }
}

/// Direction of the short-term traffic projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    /// Congestion is rising.
    Increasing,
    /// Congestion is falling.
    Decreasing,
    /// No measurable change, or not enough data.
    Stable,
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

/// Forecast domain of a prediction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum PredictionDomain {
    /// Traffic patterns.
    Traffic,
    /// Security risk.
    Security,
    /// Utility demand.
    Utilities,
    /// Emergency call volume.
    Emergency,
}

/// Expected impact of a predicted situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "UPPERCASE")]
pub enum Impact {
    /// Little operational impact.
    Low,
    /// Noticeable impact.
    Medium,
    /// Significant impact.
    High,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_bands_cover_every_value_once() {
        assert_eq!(SeverityBand::from_severity(1), SeverityBand::Normal);
        assert_eq!(SeverityBand::from_severity(2), SeverityBand::Normal);
        assert_eq!(SeverityBand::from_severity(3), SeverityBand::Warning);
        assert_eq!(SeverityBand::from_severity(4), SeverityBand::Critical);
        assert_eq!(SeverityBand::from_severity(5), SeverityBand::Critical);
    }

    #[test]
    fn alert_level_orders_critical_above_warning() {
        assert!(AlertLevel::Critical > AlertLevel::Warning);
        assert_eq!(AlertLevel::from_severity(2), None);
        assert_eq!(AlertLevel::from_severity(3), Some(AlertLevel::Warning));
    }

    #[test]
    fn channel_resolves_from_both_names() {
        assert_eq!(Channel::from_name("traffic"), Some(Channel::Traffic));
        assert_eq!(Channel::from_name("system_metrics"), Some(Channel::Metrics));
        assert_eq!(Channel::from_name("weather"), None);
    }

    #[test]
    fn operation_type_wire_format() {
        let json = serde_json::to_string(&OperationType::Security).ok();
        assert_eq!(json.as_deref(), Some("\"SECURITY\""));
        let impact: Option<Impact> = serde_json::from_str("\"MEDIUM\"").ok();
        assert_eq!(impact, Some(Impact::Medium));
    }

    #[test]
    fn congestion_bands() {
        assert_eq!(CongestionBand::from_congestion(9), CongestionBand::Heavy);
        assert_eq!(CongestionBand::from_congestion(6), CongestionBand::Moderate);
        assert_eq!(CongestionBand::from_congestion(0), CongestionBand::Light);
    }
}
