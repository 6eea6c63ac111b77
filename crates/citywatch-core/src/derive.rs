//! Derivation engine: display-ready values computed from a [`Snapshot`].
//!
//! Every function here is pure. Called twice on the same snapshot it
//! returns identical output, so consumers may memoize by
//! [`Snapshot::version`]. Unset slots are treated as empty; no derivation
//! fails because a channel has not delivered yet.
//!
//! The stats thresholds (`congestion > 7` for a traffic incident,
//! `SECURITY && severity > 3` for a security alert) are fixed constants
//! shared with the dashboard and are not configurable.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use citywatch_types::{
    Alert, AlertLevel, AlertSource, CongestionBand, DashboardStats, IotEvent, MapMarker,
    MetricGauge, OperationType, SeverityBand, TrafficChartPoint, TrafficOverviewEntry, TrafficSample,
    TrafficTrend, TrendDirection,
};
use serde::Serialize;

use crate::config::AlertConfig;
use crate::store::Snapshot;
use crate::validate::MAX_CONGESTION;

/// Congestion strictly above this counts as a traffic incident.
pub const TRAFFIC_INCIDENT_CONGESTION: u8 = 7;

/// Security severity strictly above this counts as a security alert.
pub const SECURITY_ALERT_SEVERITY: u8 = 3;

/// Severity at or above this is critical (stats, alerts, markers).
pub const CRITICAL_SEVERITY: u8 = 4;

/// Gauge percentage at or above this is critical.
const GAUGE_CRITICAL_PERCENT: f64 = 90.0;

/// Gauge percentage at or above this is a warning.
const GAUGE_WARNING_PERCENT: f64 = 75.0;

/// Confidence of a two-sample projection; each further sample adds
/// [`TREND_CONFIDENCE_STEP`] up to [`TREND_CONFIDENCE_MAX`].
const TREND_CONFIDENCE_BASE: u8 = 50;
const TREND_CONFIDENCE_STEP: u8 = 5;
const TREND_CONFIDENCE_MAX: u8 = 95;

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Headline figures for the dashboard cards.
pub fn compute_stats(snapshot: &Snapshot) -> DashboardStats {
    let ops = snapshot.operations();

    let traffic_incident_count = snapshot
        .traffic()
        .iter()
        .filter(|s| s.congestion_level > TRAFFIC_INCIDENT_CONGESTION)
        .count();

    let security_alert_count = ops
        .iter()
        .filter(|op| {
            op.operation_type == OperationType::Security && op.severity > SECURITY_ALERT_SEVERITY
        })
        .count();

    let critical_operations_count = ops
        .iter()
        .filter(|op| op.severity >= CRITICAL_SEVERITY)
        .count();

    let mut operations_by_type: BTreeMap<OperationType, u32> =
        OperationType::ALL.into_iter().map(|t| (t, 0)).collect();
    for op in ops {
        if let Some(count) = operations_by_type.get_mut(&op.operation_type) {
            *count = count.saturating_add(1);
        }
    }

    DashboardStats {
        active_operations_count: count_u32(ops.len()),
        traffic_incident_count: count_u32(traffic_incident_count),
        security_alert_count: count_u32(security_alert_count),
        utility_status_percent: utility_status_percent(snapshot),
        critical_operations_count: count_u32(critical_operations_count),
        operations_by_type,
        active_devices: count_u32(snapshot.iot.as_ref().map_or(0, IotEvent::device_count)),
    }
}

/// Share of utility operations below the critical band, rounded down.
///
/// 100 when there are no utility operations.
fn utility_status_percent(snapshot: &Snapshot) -> u8 {
    let (total, healthy) = snapshot
        .operations()
        .iter()
        .filter(|op| op.operation_type == OperationType::Utility)
        .fold((0usize, 0usize), |(total, healthy), op| {
            let ok = usize::from(op.severity < CRITICAL_SEVERITY);
            (total.saturating_add(1), healthy.saturating_add(ok))
        });

    if total == 0 {
        return 100;
    }
    let percent = healthy.saturating_mul(100).checked_div(total).unwrap_or(100);
    u8::try_from(percent).unwrap_or(100)
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Map a congestion level (0-10) onto the 1-5 severity scale, rounding up.
pub const fn congestion_severity(level: u8) -> u8 {
    level.saturating_add(1) / 2
}

/// Alerts derived from operations and traffic, most severe first.
///
/// Order: alert class (critical before warning), then severity, then the
/// earlier event first.
pub fn compute_alerts(snapshot: &Snapshot, config: &AlertConfig) -> Vec<Alert> {
    let derived_at = snapshot.updated_at.unwrap_or_default();
    let mut alerts = Vec::new();

    for op in snapshot.operations() {
        let Some(level) = AlertLevel::from_severity(op.severity) else {
            continue;
        };
        alerts.push(Alert {
            source: AlertSource::Operation {
                id: op.id.clone(),
                operation_type: op.operation_type,
            },
            level,
            severity: op.severity,
            location: op.location.clone(),
            message: format!("{} severity {}: {}", op.operation_type.label(), op.severity, op.description),
            occurred_at: op.timestamp,
            derived_at,
        });
    }

    for sample in snapshot.traffic() {
        if sample.congestion_level < config.traffic_congestion_threshold {
            continue;
        }
        let severity = congestion_severity(sample.congestion_level);
        let Some(level) = AlertLevel::from_severity(severity) else {
            continue;
        };
        alerts.push(Alert {
            source: AlertSource::Traffic {
                congestion_level: sample.congestion_level,
            },
            level,
            severity,
            location: sample.location.clone(),
            message: format!(
                "Congestion {}/{MAX_CONGESTION} at {}, average speed {:.0} km/h",
                sample.congestion_level, sample.location, sample.average_speed
            ),
            occurred_at: sample.timestamp,
            derived_at,
        });
    }

    alerts.sort_by(alert_order);
    alerts
}

fn alert_order(a: &Alert, b: &Alert) -> Ordering {
    b.level
        .cmp(&a.level)
        .then_with(|| b.severity.cmp(&a.severity))
        .then_with(|| a.occurred_at.cmp(&b.occurred_at))
}

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

/// One marker per live operation, colored by severity band.
pub fn compute_map_markers(snapshot: &Snapshot) -> Vec<MapMarker> {
    snapshot
        .operations()
        .iter()
        .map(|op| MapMarker {
            id: op.id.clone(),
            operation_type: op.operation_type,
            location: op.location.clone(),
            latitude: op.latitude,
            longitude: op.longitude,
            severity: op.severity,
            band: SeverityBand::from_severity(op.severity),
            description: op.description.clone(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Traffic
// ---------------------------------------------------------------------------

/// Traffic readings that share one timestamp, folded across locations.
#[derive(Debug, Clone, PartialEq)]
struct TrafficBucket {
    timestamp: DateTime<Utc>,
    /// Mean congestion, rounded half up.
    congestion: u8,
    /// Total vehicles over every location.
    vehicles: u32,
    /// Mean speed.
    speed: f64,
}

/// Fold the time-ascending series into one bucket per timestamp.
fn bucket_by_timestamp(samples: &[TrafficSample]) -> Vec<TrafficBucket> {
    samples
        .chunk_by(|a, b| a.timestamp == b.timestamp)
        .filter_map(|group| {
            let first = group.first()?;
            let n = u32::try_from(group.len()).unwrap_or(u32::MAX);
            let (congestion_sum, vehicles, speed_sum) =
                group.iter().fold((0u32, 0u32, 0.0_f64), |(c, v, sp), s| {
                    (
                        c.saturating_add(u32::from(s.congestion_level)),
                        v.saturating_add(s.vehicle_count),
                        sp + s.average_speed,
                    )
                });
            let mean = congestion_sum
                .saturating_add(n / 2)
                .checked_div(n)
                .unwrap_or(0);
            Some(TrafficBucket {
                timestamp: first.timestamp,
                congestion: u8::try_from(mean).unwrap_or(MAX_CONGESTION),
                vehicles,
                speed: speed_sum / f64::from(n),
            })
        })
        .collect()
}

/// Project the next hour from the last two timestamps of the series.
///
/// Samples taken at the same instant (one per location) are averaged
/// first, so a multi-location feed moves the trend only when the city-wide
/// level moves. With fewer than two timestamps the trend is `stable` with
/// confidence 0; the estimate is then that timestamp's level, or 0 for an
/// empty series.
pub fn compute_traffic_trend(snapshot: &Snapshot) -> TrafficTrend {
    let buckets = bucket_by_timestamp(snapshot.traffic());
    let (prev, last) = match buckets.as_slice() {
        [.., prev, last] => (prev, last),
        [only] => {
            return TrafficTrend {
                next_hour_estimate: only.congestion,
                trend: TrendDirection::Stable,
                confidence: 0,
            };
        }
        [] => {
            return TrafficTrend {
                next_hour_estimate: 0,
                trend: TrendDirection::Stable,
                confidence: 0,
            };
        }
    };

    let last_level = i16::from(last.congestion);
    let delta = last_level.saturating_sub(i16::from(prev.congestion));
    let trend = match delta.cmp(&0) {
        Ordering::Greater => TrendDirection::Increasing,
        Ordering::Less => TrendDirection::Decreasing,
        Ordering::Equal => TrendDirection::Stable,
    };
    let projected = last_level
        .saturating_add(delta)
        .clamp(0, i16::from(MAX_CONGESTION));

    let extra = u8::try_from(buckets.len().saturating_sub(2)).unwrap_or(u8::MAX);
    let confidence = TREND_CONFIDENCE_BASE
        .saturating_add(extra.saturating_mul(TREND_CONFIDENCE_STEP))
        .min(TREND_CONFIDENCE_MAX);

    TrafficTrend {
        next_hour_estimate: u8::try_from(projected).unwrap_or(0),
        trend,
        confidence,
    }
}

/// Latest reading per location, most congested first.
pub fn compute_traffic_overview(snapshot: &Snapshot) -> Vec<TrafficOverviewEntry> {
    // The series is time-ascending, so later samples overwrite earlier ones.
    let latest: BTreeMap<&str, &TrafficSample> = snapshot
        .traffic()
        .iter()
        .map(|s| (s.location.as_str(), s))
        .collect();

    let mut entries: Vec<TrafficOverviewEntry> = latest
        .into_values()
        .map(|s| TrafficOverviewEntry {
            location: s.location.clone(),
            congestion_level: s.congestion_level,
            band: CongestionBand::from_congestion(s.congestion_level),
            average_speed: s.average_speed,
            timestamp: s.timestamp,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.congestion_level
            .cmp(&a.congestion_level)
            .then_with(|| a.location.cmp(&b.location))
    });
    entries
}

/// The traffic series as chart points, oldest first.
///
/// One point per timestamp: mean congestion and speed, total vehicles.
pub fn compute_traffic_series(snapshot: &Snapshot) -> Vec<TrafficChartPoint> {
    bucket_by_timestamp(snapshot.traffic())
        .into_iter()
        .map(|b| TrafficChartPoint {
            time: b.timestamp.format("%H:%M").to_string(),
            congestion: b.congestion,
            vehicles: b.vehicles,
            speed: b.speed,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// System health
// ---------------------------------------------------------------------------

fn percent_band(value: f64) -> SeverityBand {
    if value >= GAUGE_CRITICAL_PERCENT {
        SeverityBand::Critical
    } else if value >= GAUGE_WARNING_PERCENT {
        SeverityBand::Warning
    } else {
        SeverityBand::Normal
    }
}

/// Gauges for the health panel. Empty while the metrics slot is unset.
pub fn compute_metric_gauges(snapshot: &Snapshot) -> Vec<MetricGauge> {
    let Some(metrics) = snapshot.metrics.as_ref() else {
        return Vec::new();
    };

    let percent = |name: &str, value: f64| MetricGauge {
        name: name.to_owned(),
        value,
        unit: String::from("%"),
        band: Some(percent_band(value)),
    };

    #[allow(clippy::cast_precision_loss)]
    let connections = metrics.active_connections as f64;

    let mut gauges = vec![
        percent("cpu", metrics.cpu),
        percent("memory", metrics.memory),
        percent("storage", metrics.storage),
        MetricGauge {
            name: String::from("network"),
            value: metrics.network,
            unit: String::from("Mbps"),
            band: None,
        },
        MetricGauge {
            name: String::from("activeConnections"),
            value: connections,
            unit: String::new(),
            band: None,
        },
    ];
    gauges.extend(metrics.gauges.iter().map(|(name, value)| MetricGauge {
        name: name.clone(),
        value: *value,
        unit: String::new(),
        band: None,
    }));
    gauges
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// Every derived view for one snapshot version.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedViews {
    /// Snapshot version these views were computed from.
    pub version: u64,
    /// Dashboard cards.
    pub stats: DashboardStats,
    /// Ordered alert list.
    pub alerts: Vec<Alert>,
    /// Map markers.
    pub markers: Vec<MapMarker>,
    /// Next-hour traffic projection.
    pub trend: TrafficTrend,
    /// Latest reading per traffic location.
    pub traffic_overview: Vec<TrafficOverviewEntry>,
    /// Traffic chart series.
    pub traffic_series: Vec<TrafficChartPoint>,
    /// Health panel gauges.
    pub gauges: Vec<MetricGauge>,
}

impl DerivedViews {
    /// Run every derivation over `snapshot`.
    pub fn compute(snapshot: &Snapshot, config: &AlertConfig) -> Self {
        Self {
            version: snapshot.version,
            stats: compute_stats(snapshot),
            alerts: compute_alerts(snapshot, config),
            markers: compute_map_markers(snapshot),
            trend: compute_traffic_trend(snapshot),
            traffic_overview: compute_traffic_overview(snapshot),
            traffic_series: compute_traffic_series(snapshot),
            gauges: compute_metric_gauges(snapshot),
        }
    }
}
