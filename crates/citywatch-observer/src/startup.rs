//! Observer server startup for the server binary.
//!
//! [`spawn_observer`] binds the listener before it returns, so a bad
//! address or a port already in use fails startup rather than a detached
//! task. Serving then runs on a background Tokio task owned by the
//! returned [`RunningObserver`].

use std::net::SocketAddr;
use std::sync::Arc;

use citywatch_core::config::ObserverConfig;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Errors from starting or running the Observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// `host:port` is not a socket address.
    #[error("invalid observer address {addr}: {reason}")]
    Address {
        /// The configured `host:port`.
        addr: String,
        /// Parser message.
        reason: String,
    },

    /// The listener could not bind.
    #[error("bind failed on {addr}: {source}")]
    Bind {
        /// The address that was tried.
        addr: SocketAddr,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serving failed after the listener was bound.
    #[error("observer server stopped: {source}")]
    Serve {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The serve task panicked.
    #[error("observer task failed: {reason}")]
    Task {
        /// The join error message.
        reason: String,
    },
}

/// Parse the configured `host:port` into a socket address.
///
/// # Errors
///
/// Returns [`StartupError::Address`] if the pair does not parse.
pub fn socket_addr(config: &ObserverConfig) -> Result<SocketAddr, StartupError> {
    let addr = format!("{}:{}", config.host, config.port);
    addr.parse().map_err(|e: std::net::AddrParseError| StartupError::Address {
        reason: e.to_string(),
        addr,
    })
}

/// A bound Observer server serving on a background task.
#[derive(Debug)]
pub struct RunningObserver {
    addr: SocketAddr,
    task: JoinHandle<Result<(), StartupError>>,
}

impl RunningObserver {
    /// The address the listener is bound to. With port 0 this carries the
    /// port the OS picked.
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait until the server stops.
    ///
    /// Resolves `Ok(())` only if the task was aborted.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::Serve`] if serving failed, or
    /// [`StartupError::Task`] if the task panicked.
    pub async fn stopped(&mut self) -> Result<(), StartupError> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(join) if join.is_cancelled() => Ok(()),
            Err(join) => Err(StartupError::Task {
                reason: join.to_string(),
            }),
        }
    }

    /// Stop serving.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Bind the Observer listener and serve on a background Tokio task.
///
/// # Errors
///
/// Returns [`StartupError::Address`] or [`StartupError::Bind`]. Both are
/// detected before anything is spawned.
pub async fn spawn_observer(
    config: &ObserverConfig,
    state: Arc<AppState>,
) -> Result<RunningObserver, StartupError> {
    let requested = socket_addr(config)?;
    let listener = TcpListener::bind(requested)
        .await
        .map_err(|source| StartupError::Bind {
            addr: requested,
            source,
        })?;
    let addr = listener
        .local_addr()
        .map_err(|source| StartupError::Bind {
            addr: requested,
            source,
        })?;

    let router = build_router(state);
    let task = tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .map_err(|source| StartupError::Serve { source })
    });

    info!(%addr, "Observer server listening");
    Ok(RunningObserver { addr, task })
}
