//! Snapshot store: the latest known value per channel.
//!
//! Every mutation goes through [`SnapshotStore::apply`]. Operations,
//! metrics, and IoT slots are replaced wholesale; the traffic slot is a
//! time-ascending series capped at the configured window. A payload that
//! fails validation leaves every slot exactly as it was.
//!
//! The store never triggers recomputation itself. The engine decides when
//! to derive views, which lets it fold a burst of updates into one pass.

use chrono::{DateTime, Utc};
use citywatch_types::{
    Channel, ChannelPayload, IotEvent, OperationEvent, SystemMetrics, TrafficSample,
};
use serde::Serialize;

use crate::validate::{ValidationError, validate_payload};

/// The aggregate of all channels' latest values at one point in time.
///
/// `None` marks a slot that has never been set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Number of successful applies so far.
    pub version: u64,
    /// Live operations.
    pub operations: Option<Vec<OperationEvent>>,
    /// Traffic series, oldest first.
    pub traffic: Option<Vec<TrafficSample>>,
    /// System gauges.
    pub metrics: Option<SystemMetrics>,
    /// Latest device telemetry.
    pub iot: Option<IotEvent>,
    /// When the last successful apply happened.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Live operations, empty when the slot is unset.
    pub fn operations(&self) -> &[OperationEvent] {
        self.operations.as_deref().unwrap_or_default()
    }

    /// Traffic series, empty when the slot is unset.
    pub fn traffic(&self) -> &[TrafficSample] {
        self.traffic.as_deref().unwrap_or_default()
    }

    /// Whether the slot for `channel` has been set.
    pub const fn is_set(&self, channel: Channel) -> bool {
        match channel {
            Channel::Operations => self.operations.is_some(),
            Channel::Traffic => self.traffic.is_some(),
            Channel::Metrics => self.metrics.is_some(),
            Channel::Iot => self.iot.is_some(),
        }
    }
}

/// Owner of the live [`Snapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    snapshot: Snapshot,
    traffic_window: usize,
}

impl SnapshotStore {
    /// Create an empty store keeping at most `traffic_window` samples.
    ///
    /// A window of zero is treated as one.
    pub fn new(traffic_window: usize) -> Self {
        Self {
            snapshot: Snapshot::default(),
            traffic_window: traffic_window.max(1),
        }
    }

    /// Merge a payload into its channel's slot, stamped with the current time.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the payload is invalid; the store is
    /// unchanged in that case.
    pub fn apply(&mut self, payload: ChannelPayload) -> Result<u64, ValidationError> {
        self.apply_at(payload, Utc::now())
    }

    /// Merge a payload with an explicit receive time.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the payload is invalid; the store is
    /// unchanged in that case.
    pub fn apply_at(
        &mut self,
        payload: ChannelPayload,
        received_at: DateTime<Utc>,
    ) -> Result<u64, ValidationError> {
        validate_payload(&payload)?;

        match payload {
            ChannelPayload::Operations(ops) => self.snapshot.operations = Some(ops),
            ChannelPayload::Traffic(samples) => {
                let merged = self.merge_traffic(samples);
                self.snapshot.traffic = Some(merged);
            }
            ChannelPayload::Metrics(metrics) => self.snapshot.metrics = Some(metrics),
            ChannelPayload::Iot(event) => self.snapshot.iot = Some(event),
        }

        self.snapshot.version = self.snapshot.version.saturating_add(1);
        self.snapshot.updated_at = Some(received_at);
        Ok(self.snapshot.version)
    }

    /// Append samples, restore time order, and drop the oldest beyond the
    /// window.
    fn merge_traffic(&self, samples: Vec<TrafficSample>) -> Vec<TrafficSample> {
        let mut merged = self.snapshot.traffic.clone().unwrap_or_default();
        merged.extend(samples);
        // Stable: samples sharing a timestamp keep delivery order.
        merged.sort_by_key(|s| s.timestamp);
        let excess = merged.len().saturating_sub(self.traffic_window);
        merged.drain(..excess);
        merged
    }

    /// The current value of a channel's slot, or `None` if it is unset.
    pub fn read(&self, channel: Channel) -> Option<ChannelPayload> {
        match channel {
            Channel::Operations => self
                .snapshot
                .operations
                .clone()
                .map(ChannelPayload::Operations),
            Channel::Traffic => self.snapshot.traffic.clone().map(ChannelPayload::Traffic),
            Channel::Metrics => self.snapshot.metrics.clone().map(ChannelPayload::Metrics),
            Channel::Iot => self.snapshot.iot.clone().map(ChannelPayload::Iot),
        }
    }

    /// Monotonic counter bumped on every successful apply.
    pub const fn version(&self) -> u64 {
        self.snapshot.version
    }

    /// Borrow the whole snapshot.
    pub const fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The configured traffic window.
    pub const fn traffic_window(&self) -> usize {
        self.traffic_window
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, TimeZone};
    use citywatch_types::{OperationId, OperationType};

    use super::*;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap()
    }

    fn op(severity: u8) -> OperationEvent {
        OperationEvent {
            id: OperationId::new(),
            operation_type: OperationType::Security,
            location: String::from("Central Station"),
            severity,
            latitude: 40.75,
            longitude: -73.99,
            description: String::from("Unusual activity detected"),
            timestamp: base_time(),
        }
    }

    fn sample(hour: i64, congestion: u8) -> TrafficSample {
        TrafficSample {
            location: String::from("Downtown Loop"),
            congestion_level: congestion,
            vehicle_count: 300,
            average_speed: 35.0,
            timestamp: base_time() + Duration::hours(hour),
        }
    }

    #[test]
    fn new_store_is_empty() {
        let store = SnapshotStore::new(24);
        assert_eq!(store.version(), 0);
        for channel in Channel::ALL {
            assert!(store.read(channel).is_none());
            assert!(!store.snapshot().is_set(channel));
        }
    }

    #[test]
    fn last_write_wins_for_operations() {
        let mut store = SnapshotStore::new(24);
        store.apply(ChannelPayload::Operations(vec![op(2), op(3)])).unwrap();
        let latest = vec![op(5)];
        store.apply(ChannelPayload::Operations(latest.clone())).unwrap();
        assert_eq!(store.read(Channel::Operations), Some(ChannelPayload::Operations(latest)));
        assert_eq!(store.version(), 2);
    }

    fn metrics(cpu: f64) -> SystemMetrics {
        SystemMetrics {
            cpu,
            memory: 68.0,
            storage: 42.0,
            network: 520.0,
            active_connections: 1247,
            data_throughput_label: String::from("2.4 GB/s"),
            gauges: BTreeMap::new(),
        }
    }

    #[test]
    fn last_write_wins_for_metrics() {
        let mut store = SnapshotStore::new(24);
        store.apply(ChannelPayload::Metrics(metrics(45.0))).unwrap();
        let mut latest = metrics(71.0);
        latest.gauges.insert(String::from("responseTime"), 45.0);
        store.apply(ChannelPayload::Metrics(latest.clone())).unwrap();
        assert_eq!(store.read(Channel::Metrics), Some(ChannelPayload::Metrics(latest)));
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn last_write_wins_for_iot() {
        let mut store = SnapshotStore::new(24);
        store
            .apply(ChannelPayload::Iot(IotEvent(serde_json::json!({"devices": [1, 2, 3]}))))
            .unwrap();
        let latest = IotEvent(serde_json::json!({"devices": [], "gateway": "north"}));
        store.apply(ChannelPayload::Iot(latest.clone())).unwrap();
        assert_eq!(store.read(Channel::Iot), Some(ChannelPayload::Iot(latest)));
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn rejected_apply_leaves_slot_and_version_untouched() {
        let mut store = SnapshotStore::new(24);
        let good = vec![op(4)];
        store.apply(ChannelPayload::Operations(good.clone())).unwrap();

        for bad in [0, 6] {
            let result = store.apply(ChannelPayload::Operations(vec![op(2), op(bad)]));
            assert!(matches!(result, Err(ValidationError::SeverityOutOfRange { .. })));
        }

        assert_eq!(store.read(Channel::Operations), Some(ChannelPayload::Operations(good)));
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn rejection_on_one_channel_does_not_touch_others() {
        let mut store = SnapshotStore::new(24);
        store.apply(ChannelPayload::Traffic(vec![sample(0, 5)])).unwrap();
        let result = store.apply(ChannelPayload::Operations(vec![op(9)]));
        assert!(result.is_err());
        assert_eq!(store.snapshot().traffic().len(), 1);
        assert!(!store.snapshot().is_set(Channel::Operations));
    }

    #[test]
    fn traffic_window_keeps_most_recent_in_order() {
        let mut store = SnapshotStore::new(24);
        let first: Vec<_> = (0..20).map(|h| sample(h, 5)).collect();
        let second: Vec<_> = (20..30).map(|h| sample(h, 6)).collect();
        store.apply(ChannelPayload::Traffic(first)).unwrap();
        store.apply(ChannelPayload::Traffic(second)).unwrap();

        let traffic = store.snapshot().traffic();
        assert_eq!(traffic.len(), 24);
        assert_eq!(traffic.first().map(|s| s.timestamp), Some(base_time() + Duration::hours(6)));
        assert_eq!(traffic.last().map(|s| s.timestamp), Some(base_time() + Duration::hours(29)));
        assert!(traffic.windows(2).all(|w| match w {
            [a, b] => a.timestamp <= b.timestamp,
            _ => true,
        }));
    }

    #[test]
    fn out_of_order_samples_are_placed_by_time() {
        let mut store = SnapshotStore::new(3);
        store.apply(ChannelPayload::Traffic(vec![sample(5, 1), sample(7, 2)])).unwrap();
        store.apply(ChannelPayload::Traffic(vec![sample(6, 3), sample(1, 4)])).unwrap();

        let levels: Vec<u8> = store.snapshot().traffic().iter().map(|s| s.congestion_level).collect();
        assert_eq!(levels, vec![1, 3, 2]);
    }

    #[test]
    fn invalid_traffic_batch_is_all_or_nothing() {
        let mut store = SnapshotStore::new(24);
        store.apply(ChannelPayload::Traffic(vec![sample(0, 4)])).unwrap();
        let result = store.apply(ChannelPayload::Traffic(vec![sample(1, 7), sample(2, 11)]));
        assert!(result.is_err());
        assert_eq!(store.snapshot().traffic().len(), 1);
    }

    #[test]
    fn apply_at_records_receive_time() {
        let mut store = SnapshotStore::new(24);
        let at = base_time() + Duration::minutes(3);
        store
            .apply_at(ChannelPayload::Iot(IotEvent(serde_json::json!({"devices": []}))), at)
            .unwrap();
        assert_eq!(store.snapshot().updated_at, Some(at));
        assert!(store.snapshot().is_set(Channel::Iot));
    }

    #[test]
    fn zero_window_is_treated_as_one() {
        let store = SnapshotStore::new(0);
        assert_eq!(store.traffic_window(), 1);
    }
}
