//! Citywatch server binary.
//!
//! Wires the engine loop, the HTTP prediction source, the in-process
//! channel adapter, and the Observer API together, then runs until
//! `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `CITYWATCH_CONFIG` (default
//!    `citywatch-config.yaml`)
//! 2. Initialize structured logging (tracing)
//! 3. Spawn the engine with the HTTP prediction source
//! 4. Attach the engine to the in-process channel adapter
//! 5. Start the Observer API server
//! 6. Request an initial prediction refresh in the background
//! 7. Wait for `Ctrl-C` or for the Observer server to fail, then shut
//!    down

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use citywatch_core::channel::LocalChannelAdapter;
use citywatch_core::config::{CitywatchConfig, LogFormat, LoggingConfig};
use citywatch_core::engine::spawn_engine;
use citywatch_core::prediction::HttpPredictionSource;
use citywatch_observer::startup::spawn_observer;
use citywatch_observer::state::AppState;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Default config file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "citywatch-config.yaml";

/// How long shutdown waits for the engine loop to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration or adapter wiring fails, or if the
/// Observer server fails to bind or stops serving.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration.
    let config_path = std::env::var("CITYWATCH_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        config = %config_path.display(),
        traffic_window = config.store.traffic_window,
        queue_capacity = config.engine.queue_capacity,
        prediction_url = config.predictions.source_url,
        prediction_timeout_ms = config.predictions.timeout_ms,
        "citywatch-server starting"
    );

    // 3. Spawn the engine.
    let source = HttpPredictionSource::from_config(&config.predictions);
    info!(endpoint = source.endpoint(), "Prediction source configured");
    let (dashboard, engine_task) = spawn_engine(&config, source);

    // 4. Attach to the channel adapter.
    let adapter = LocalChannelAdapter::new();
    let subscriptions = dashboard.engine().attach(&adapter)?;

    // 5. Start the Observer API server.
    let state = Arc::new(AppState::new(dashboard.clone(), adapter.clone()));
    let mut observer = spawn_observer(&config.observer, state).await?;

    // 6. Initial prediction refresh.
    let refresher = dashboard.clone();
    tokio::spawn(async move {
        if let Err(e) = refresher.request_prediction_refresh().await {
            warn!(error = %e, "Initial prediction refresh failed");
        }
    });

    // 7. Run until interrupted or the API dies.
    let exit: Result<(), AppError> = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            info!(version = dashboard.version(), "Shutdown requested");
            signal.map_err(AppError::from)
        }
        stopped = observer.stopped() => {
            error!(version = dashboard.version(), "Observer server stopped, shutting down");
            stopped.map_err(AppError::from)
        }
    };

    observer.abort();
    drop(subscriptions);
    adapter.close();
    drop(dashboard);
    // Open connections may still hold dashboard clones.
    if tokio::time::timeout(SHUTDOWN_GRACE, engine_task).await.is_err() {
        warn!("Engine still referenced at shutdown, exiting anyway");
    }

    info!("citywatch-server stopped");
    exit
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Load configuration from `path`, falling back to defaults (plus env
/// overrides) when the file does not exist.
fn load_config(path: &Path) -> Result<CitywatchConfig, AppError> {
    if path.exists() {
        Ok(CitywatchConfig::from_file(path)?)
    } else {
        let mut config = CitywatchConfig::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let config = load_config(Path::new("does-not-exist/citywatch-config.yaml")).unwrap();
        assert_eq!(config.store.traffic_window, 24);
        assert_eq!(config.engine.queue_capacity, 1024);
    }

    #[test]
    fn invalid_file_is_a_config_error() {
        let path = std::env::temp_dir().join("citywatch-invalid-config.yaml");
        std::fs::write(&path, "engine:\n  queue_capacity: 0\n").unwrap();
        let result = load_config(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(AppError::Config { .. })));
    }
}
