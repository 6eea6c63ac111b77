//! Prediction cache and the sources that feed it.
//!
//! Forecasts are opaque external data: the analysis service produces a
//! [`PredictionSet`], the cache stores the latest one, and nothing here
//! computes predictions. The cache is independent of the live snapshot and
//! only changes when [`PredictionCache::refresh`] commits a new set.
//!
//! # Refresh semantics
//!
//! - Readers keep seeing the previous set while a refresh is in flight.
//! - A refresh is bounded by the configured timeout; a timeout is reported
//!   like any other failure.
//! - Failure never clears the cached set.
//! - Each call takes a generation number when it starts. A result is only
//!   committed if no newer refresh has been issued since, so a slow earlier
//!   call can never overwrite a newer one.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use citywatch_types::PredictionSet;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::PredictionConfig;

/// Highest valid confidence percentage.
const MAX_CONFIDENCE: u8 = 100;

/// Errors reported by a prediction refresh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredictionError {
    /// The analysis service failed or was unreachable.
    #[error("prediction source error: {0}")]
    Source(String),

    /// The analysis did not complete within the deadline.
    #[error("prediction refresh timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The analysis returned a set that breaks the record rules.
    #[error("invalid prediction set: {0}")]
    Invalid(String),
}

/// Outcome of a refresh that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The new set is now current.
    Committed(Arc<PredictionSet>),
    /// A newer refresh was issued while this one was in flight; its result
    /// was discarded.
    Superseded,
}

/// A request/response source of prediction sets.
pub trait PredictionSource: Send + Sync {
    /// Run one analysis.
    ///
    /// # Errors
    ///
    /// Returns [`PredictionError`] when the analysis cannot be obtained.
    fn fetch(&self) -> impl Future<Output = Result<PredictionSet, PredictionError>> + Send;
}

/// Check the per-record rules: each record sits in its own domain slot and
/// confidence is a percentage.
///
/// # Errors
///
/// Returns [`PredictionError::Invalid`] naming the first bad record.
pub fn validate_prediction_set(set: &PredictionSet) -> Result<(), PredictionError> {
    for (slot, record) in set.records() {
        if record.domain != slot {
            return Err(PredictionError::Invalid(format!(
                "{slot:?} slot holds a {:?} record",
                record.domain
            )));
        }
        if record.confidence > MAX_CONFIDENCE {
            return Err(PredictionError::Invalid(format!(
                "{slot:?} confidence {} exceeds {MAX_CONFIDENCE}",
                record.confidence
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// HTTP source
// ---------------------------------------------------------------------------

/// Prediction source backed by the analysis service's HTTP API.
///
/// Sends `GET {base_url}/predictions` and expects a JSON [`PredictionSet`]
/// with all four domain records. The analysis service has to serve this
/// aggregated endpoint; its per-domain text endpoints are not read.
pub struct HttpPredictionSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPredictionSource {
    /// Create a source for the given service base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Create a source from the predictions config section.
    pub fn from_config(config: &PredictionConfig) -> Self {
        Self::new(config.source_url.clone())
    }

    /// The full URL this source requests.
    pub fn endpoint(&self) -> String {
        format!("{}/predictions", self.base_url.trim_end_matches('/'))
    }
}

impl PredictionSource for HttpPredictionSource {
    async fn fetch(&self) -> Result<PredictionSet, PredictionError> {
        let url = self.endpoint();

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| PredictionError::Source(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(PredictionError::Source(format!(
                "analysis service returned {status}: {error_body}"
            )));
        }

        response
            .json::<PredictionSet>()
            .await
            .map_err(|e| PredictionError::Source(format!("response parse failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Holds the latest committed [`PredictionSet`].
pub struct PredictionCache<S> {
    source: S,
    timeout: Duration,
    latest_issued: AtomicU64,
    current: watch::Sender<Option<Arc<PredictionSet>>>,
}

impl<S: PredictionSource> PredictionCache<S> {
    /// Create an empty cache over `source` with a refresh deadline.
    pub fn new(source: S, timeout: Duration) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            source,
            timeout,
            latest_issued: AtomicU64::new(0),
            current,
        }
    }

    /// The latest committed set, or `None` if no refresh has succeeded yet.
    ///
    /// Never blocks on an in-flight refresh.
    pub fn current(&self) -> Option<Arc<PredictionSet>> {
        self.current.borrow().clone()
    }

    /// Watch for committed sets.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<PredictionSet>>> {
        self.current.subscribe()
    }

    /// Run the external analysis and commit its result if this is still the
    /// most recently issued refresh.
    ///
    /// # Errors
    ///
    /// Returns [`PredictionError`] on source failure, timeout, or an invalid
    /// set. The cached set is left untouched in every error case.
    pub async fn refresh(&self) -> Result<RefreshOutcome, PredictionError> {
        let generation = self.latest_issued.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        debug!(generation, "Prediction refresh started");

        let set = match tokio::time::timeout(self.timeout, self.source.fetch()).await {
            Ok(Ok(set)) => set,
            Ok(Err(e)) => {
                warn!(generation, error = %e, "Prediction refresh failed, keeping previous set");
                return Err(e);
            }
            Err(_elapsed) => {
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(generation, timeout_ms, "Prediction refresh timed out, keeping previous set");
                return Err(PredictionError::Timeout { timeout_ms });
            }
        };

        if let Err(e) = validate_prediction_set(&set) {
            warn!(generation, error = %e, "Prediction set rejected, keeping previous set");
            return Err(e);
        }

        let set = Arc::new(set);
        // The generation check runs under the watch's write lock so two
        // commits cannot interleave.
        let committed = self.current.send_if_modified(|slot| {
            if self.latest_issued.load(Ordering::Acquire) == generation {
                *slot = Some(Arc::clone(&set));
                true
            } else {
                false
            }
        });

        if committed {
            info!(generation, generated_at = %set.generated_at, "Prediction set committed");
            Ok(RefreshOutcome::Committed(set))
        } else {
            debug!(generation, "Prediction refresh superseded, result discarded");
            Ok(RefreshOutcome::Superseded)
        }
    }
}
