//! The single-queue engine and its read-side [`Dashboard`] handle.
//!
//! All channel updates funnel through one bounded `mpsc` queue into one
//! task that owns the [`SnapshotStore`]. Nothing else mutates the store.
//! After each batch of ready updates the task recomputes [`DerivedViews`]
//! once and publishes a new immutable [`Frame`] through a `watch` channel.
//! Readers clone the current frame's `Arc`s and never wait on the engine.
//!
//! ```text
//! adapter handler --submit--> mpsc --> Engine::run --> watch<Frame> --> Dashboard
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use citywatch_types::{
    Alert, Channel, ChannelPayload, DashboardStats, MapMarker, MetricGauge, PredictionSet,
    TrafficChartPoint, TrafficOverviewEntry, TrafficTrend,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{ChannelAdapter, ChannelError, Handler, Subscription};
use crate::config::{AlertConfig, CitywatchConfig};
use crate::derive::DerivedViews;
use crate::prediction::{PredictionCache, PredictionError, PredictionSource, RefreshOutcome};
use crate::store::{Snapshot, SnapshotStore};
use crate::validate::ValidationError;

/// Errors from submitting work to the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// The payload failed validation; the store is unchanged.
    #[error("update rejected: {0}")]
    Rejected(#[from] ValidationError),

    /// The inbound queue is full.
    #[error("engine queue is full")]
    QueueFull,

    /// The engine task has stopped.
    #[error("engine is not running")]
    Stopped,
}

impl From<oneshot::error::RecvError> for EngineError {
    fn from(_: oneshot::error::RecvError) -> Self {
        Self::Stopped
    }
}

/// An immutable, fully merged view of the engine state at one version.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The snapshot the views were derived from.
    pub snapshot: Arc<Snapshot>,
    /// Views derived from `snapshot`.
    pub views: Arc<DerivedViews>,
}

impl Frame {
    fn derive(snapshot: Snapshot, alerts: &AlertConfig) -> Self {
        let views = DerivedViews::compute(&snapshot, alerts);
        Self {
            snapshot: Arc::new(snapshot),
            views: Arc::new(views),
        }
    }

    /// Snapshot version of this frame.
    pub fn version(&self) -> u64 {
        self.snapshot.version
    }
}

type Reply = oneshot::Sender<Result<u64, ValidationError>>;

enum Command {
    Apply {
        payload: ChannelPayload,
        reply: Option<Reply>,
    },
}

// ---------------------------------------------------------------------------
// Engine task
// ---------------------------------------------------------------------------

/// Owner of the snapshot store. Run it with [`Engine::run`].
pub struct Engine {
    store: SnapshotStore,
    alerts: AlertConfig,
    inbox: mpsc::Receiver<Command>,
    frames: watch::Sender<Frame>,
}

impl Engine {
    /// Create an engine with an empty store, its submit handle, and a
    /// receiver for published frames.
    pub fn new(config: &CitywatchConfig) -> (Self, EngineHandle, watch::Receiver<Frame>) {
        let store = SnapshotStore::new(config.store.traffic_window);
        let initial = Frame::derive(store.snapshot().clone(), &config.alerts);
        let (frames, frames_rx) = watch::channel(initial);
        let (tx, inbox) = mpsc::channel(config.engine.queue_capacity.max(1));

        let engine = Self {
            store,
            alerts: config.alerts.clone(),
            inbox,
            frames,
        };
        (engine, EngineHandle { tx }, frames_rx)
    }

    /// Process updates until every [`EngineHandle`] is dropped.
    pub async fn run(mut self) {
        info!(
            traffic_window = self.store.traffic_window(),
            "Engine started"
        );

        while let Some(first) = self.inbox.recv().await {
            let mut replies = Vec::new();
            let mut applied = self.handle(first, &mut replies);

            // Fold everything already queued into one recomputation.
            while let Ok(next) = self.inbox.try_recv() {
                applied = applied.saturating_add(self.handle(next, &mut replies));
            }

            if applied > 0 {
                self.publish(applied);
            }

            // Replies go out after the frame so a caller that awaited an
            // apply reads views that include it.
            for (reply, result) in replies {
                let _ = reply.send(result);
            }
        }

        info!(version = self.store.version(), "Engine stopped");
    }

    fn handle(
        &mut self,
        command: Command,
        replies: &mut Vec<(Reply, Result<u64, ValidationError>)>,
    ) -> u32 {
        let Command::Apply { payload, reply } = command;
        let channel = payload.channel();
        let result = self.store.apply(payload);

        let applied = match &result {
            Ok(version) => {
                debug!(%channel, version, "Update applied");
                1
            }
            Err(e) => {
                warn!(%channel, error = %e, "Update rejected, slot unchanged");
                0
            }
        };

        if let Some(reply) = reply {
            replies.push((reply, result));
        }
        applied
    }

    fn publish(&self, applied: u32) {
        let frame = Frame::derive(self.store.snapshot().clone(), &self.alerts);
        debug!(
            version = frame.version(),
            batch = applied,
            alerts = frame.views.alerts.len(),
            "Views recomputed"
        );
        self.frames.send_replace(frame);
    }
}

// ---------------------------------------------------------------------------
// Submit handle
// ---------------------------------------------------------------------------

/// Cloneable sender side of the engine queue.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    /// Enqueue a payload without waiting for the result.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::QueueFull`] when the queue is at capacity, or
    /// [`EngineError::Stopped`] if the engine is gone.
    pub fn submit(&self, payload: ChannelPayload) -> Result<(), EngineError> {
        self.tx
            .try_send(Command::Apply {
                payload,
                reply: None,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => EngineError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => EngineError::Stopped,
            })
    }

    /// Apply a payload and wait for the new snapshot version.
    ///
    /// When this returns `Ok`, the published frame already reflects the
    /// update.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Rejected`] if validation fails, or
    /// [`EngineError::Stopped`] if the engine is gone.
    pub async fn apply(&self, payload: ChannelPayload) -> Result<u64, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Apply {
                payload,
                reply: Some(reply),
            })
            .await
            .map_err(|_closed| EngineError::Stopped)?;
        let version = rx.await??;
        Ok(version)
    }

    /// A channel handler that enqueues every delivered payload.
    ///
    /// A full queue or a stopped engine refuses the payload, which the
    /// adapter reports back to its publisher.
    pub fn handler(&self) -> Handler {
        let handle = self.clone();
        Arc::new(move |payload: ChannelPayload| {
            let channel = payload.channel();
            handle.submit(payload).map_err(|e| {
                warn!(%channel, error = %e, "Refusing channel update");
                ChannelError::Refused {
                    channel,
                    reason: e.to_string(),
                }
            })
        })
    }

    /// Subscribe the engine to all four channels on `adapter`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ChannelError`] from the adapter. Subscriptions
    /// made before the failure are dropped, which removes them.
    pub fn attach<A: ChannelAdapter + ?Sized>(
        &self,
        adapter: &A,
    ) -> Result<Vec<Subscription>, ChannelError> {
        let mut subscriptions = Vec::with_capacity(Channel::ALL.len());
        for channel in Channel::ALL {
            subscriptions.push(adapter.subscribe(channel, self.handler())?);
        }
        info!(channels = subscriptions.len(), "Engine attached to channel adapter");
        Ok(subscriptions)
    }
}

// ---------------------------------------------------------------------------
// Dashboard (view projection)
// ---------------------------------------------------------------------------

type RefreshFuture = Pin<Box<dyn Future<Output = Result<RefreshOutcome, PredictionError>> + Send>>;
type RefreshFn = Arc<dyn Fn() -> RefreshFuture + Send + Sync>;

/// Read-side handle over the engine and the prediction cache.
///
/// Every getter is synchronous and returns data from the latest published
/// frame. Cheap to clone.
#[derive(Clone)]
pub struct Dashboard {
    engine: EngineHandle,
    frames: watch::Receiver<Frame>,
    predictions: watch::Receiver<Option<Arc<PredictionSet>>>,
    refresh: RefreshFn,
}

impl Dashboard {
    /// Build a dashboard from an engine's handle and frames plus a
    /// prediction cache.
    pub fn new<S: PredictionSource + 'static>(
        engine: EngineHandle,
        frames: watch::Receiver<Frame>,
        cache: Arc<PredictionCache<S>>,
    ) -> Self {
        let predictions = cache.subscribe();
        let refresh: RefreshFn = Arc::new(move || -> RefreshFuture {
            let cache = Arc::clone(&cache);
            Box::pin(async move { cache.refresh().await })
        });
        Self {
            engine,
            frames,
            predictions,
            refresh,
        }
    }

    /// The submit handle of the underlying engine.
    pub const fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// The latest published frame.
    pub fn frame(&self) -> Frame {
        self.frames.borrow().clone()
    }

    /// A receiver that wakes on every new frame.
    pub fn watch(&self) -> watch::Receiver<Frame> {
        self.frames.clone()
    }

    /// Current snapshot version.
    pub fn version(&self) -> u64 {
        self.frames.borrow().version()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.frames.borrow().snapshot)
    }

    /// Every derived view for the current snapshot.
    pub fn views(&self) -> Arc<DerivedViews> {
        Arc::clone(&self.frames.borrow().views)
    }

    /// Headline counters.
    pub fn stats(&self) -> DashboardStats {
        self.frames.borrow().views.stats.clone()
    }

    /// Alerts, most severe first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.frames.borrow().views.alerts.clone()
    }

    /// One marker per live operation.
    pub fn map_markers(&self) -> Vec<MapMarker> {
        self.frames.borrow().views.markers.clone()
    }

    /// Short-horizon traffic outlook.
    pub fn traffic_trend(&self) -> TrafficTrend {
        self.frames.borrow().views.trend
    }

    /// Latest sample per traffic location.
    pub fn traffic_overview(&self) -> Vec<TrafficOverviewEntry> {
        self.frames.borrow().views.traffic_overview.clone()
    }

    /// The traffic series as chart points.
    pub fn traffic_series(&self) -> Vec<TrafficChartPoint> {
        self.frames.borrow().views.traffic_series.clone()
    }

    /// System metric gauges.
    pub fn metric_gauges(&self) -> Vec<MetricGauge> {
        self.frames.borrow().views.gauges.clone()
    }

    /// The latest committed prediction set, if any.
    pub fn predictions(&self) -> Option<Arc<PredictionSet>> {
        self.predictions.borrow().clone()
    }

    /// Ask the prediction source for a new set.
    ///
    /// # Errors
    ///
    /// Returns [`PredictionError`] on failure; the previous set stays
    /// current.
    pub async fn request_prediction_refresh(&self) -> Result<RefreshOutcome, PredictionError> {
        (self.refresh)().await
    }
}

impl std::fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dashboard")
            .field("version", &self.version())
            .field("predictions", &self.predictions.borrow().is_some())
            .finish_non_exhaustive()
    }
}

/// Spawn the engine task and return its dashboard.
///
/// The engine stops once the dashboard, its clones, and every handler made
/// from its [`EngineHandle`] are dropped.
pub fn spawn_engine<S: PredictionSource + 'static>(
    config: &CitywatchConfig,
    source: S,
) -> (Dashboard, JoinHandle<()>) {
    let (engine, handle, frames) = Engine::new(config);
    let cache = Arc::new(PredictionCache::new(
        source,
        Duration::from_millis(config.predictions.timeout_ms),
    ));
    let task = tokio::spawn(engine.run());
    (Dashboard::new(handle, frames, cache), task)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use citywatch_types::{OperationEvent, OperationId, OperationType};

    use super::*;
    use crate::channel::LocalChannelAdapter;
    use crate::prediction::tests::{ScriptedSource, prediction_set};

    fn op(operation_type: OperationType, severity: u8) -> OperationEvent {
        OperationEvent {
            id: OperationId::new(),
            operation_type,
            location: String::from("Financial District"),
            severity,
            latitude: 40.7074,
            longitude: -74.0113,
            description: String::from("Security breach reported"),
            timestamp: Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap(),
        }
    }

    fn idle_source() -> ScriptedSource {
        ScriptedSource::new([])
    }

    #[tokio::test]
    async fn empty_engine_is_queryable() {
        let (dashboard, _task) = spawn_engine(&CitywatchConfig::default(), idle_source());
        assert_eq!(dashboard.version(), 0);
        assert_eq!(dashboard.stats().active_operations_count, 0);
        assert_eq!(dashboard.stats().utility_status_percent, 100);
        assert!(dashboard.alerts().is_empty());
        assert!(dashboard.predictions().is_none());
    }

    #[tokio::test]
    async fn apply_is_visible_when_it_returns() {
        let (dashboard, _task) = spawn_engine(&CitywatchConfig::default(), idle_source());
        let ops = vec![op(OperationType::Security, 4), op(OperationType::Traffic, 2)];
        let version = dashboard
            .engine()
            .apply(ChannelPayload::Operations(ops))
            .await
            .unwrap();
        assert_eq!(version, 1);
        assert_eq!(dashboard.version(), 1);
        assert_eq!(dashboard.stats().security_alert_count, 1);
        assert_eq!(dashboard.map_markers().len(), 2);
    }

    #[tokio::test]
    async fn rejected_apply_is_reported_and_ignored() {
        let (dashboard, _task) = spawn_engine(&CitywatchConfig::default(), idle_source());
        let engine = dashboard.engine();
        engine
            .apply(ChannelPayload::Operations(vec![op(OperationType::Emergency, 3)]))
            .await
            .unwrap();
        let result = engine
            .apply(ChannelPayload::Operations(vec![op(OperationType::Emergency, 6)]))
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Rejected(ValidationError::SeverityOutOfRange { .. }))
        ));
        assert_eq!(dashboard.version(), 1);
        assert_eq!(dashboard.snapshot().operations().len(), 1);
    }

    #[tokio::test]
    async fn burst_of_submits_is_folded_in_order() {
        let (dashboard, _task) = spawn_engine(&CitywatchConfig::default(), idle_source());
        let engine = dashboard.engine();
        for severity in 1..=4 {
            engine
                .submit(ChannelPayload::Operations(vec![op(OperationType::Emergency, severity)]))
                .unwrap();
        }
        let last = vec![op(OperationType::Emergency, 5)];
        engine
            .apply(ChannelPayload::Operations(last.clone()))
            .await
            .unwrap();
        assert_eq!(dashboard.version(), 5);
        assert_eq!(dashboard.snapshot().operations(), last.as_slice());
    }

    #[tokio::test]
    async fn predictions_refresh_independently_of_updates() {
        let source = ScriptedSource::new([(Duration::ZERO, Ok(prediction_set(1)))]);
        let (dashboard, _task) = spawn_engine(&CitywatchConfig::default(), source);
        dashboard.request_prediction_refresh().await.unwrap();
        dashboard
            .engine()
            .apply(ChannelPayload::Operations(vec![op(OperationType::Utility, 2)]))
            .await
            .unwrap();
        assert_eq!(dashboard.predictions().as_deref(), Some(&prediction_set(1)));
    }

    #[test]
    fn full_queue_is_reported() {
        let mut config = CitywatchConfig::default();
        config.engine.queue_capacity = 1;
        let (_engine, handle, _frames) = Engine::new(&config);
        handle
            .submit(ChannelPayload::Operations(Vec::new()))
            .unwrap();
        assert_eq!(
            handle.submit(ChannelPayload::Operations(Vec::new())),
            Err(EngineError::QueueFull)
        );
    }

    #[test]
    fn full_queue_refuses_adapter_delivery() {
        let mut config = CitywatchConfig::default();
        config.engine.queue_capacity = 1;
        let (_engine, handle, _frames) = Engine::new(&config);
        let adapter = LocalChannelAdapter::new();
        let _subs = handle.attach(&adapter).unwrap();

        let ops = || ChannelPayload::Operations(vec![op(OperationType::Security, 2)]);
        assert_eq!(adapter.publish(ops()), Ok(1));
        assert!(matches!(
            adapter.publish(ops()),
            Err(ChannelError::Refused {
                channel: Channel::Operations,
                ..
            })
        ));
    }

    #[test]
    fn stopped_engine_refuses_adapter_delivery() {
        let (engine, handle, _frames) = Engine::new(&CitywatchConfig::default());
        drop(engine);
        let adapter = LocalChannelAdapter::new();
        let _subs = handle.attach(&adapter).unwrap();
        let result = adapter.publish(ChannelPayload::Operations(Vec::new()));
        assert!(matches!(result, Err(ChannelError::Refused { .. })));
    }
}
