//! Error types for the server binary.
//!
//! [`AppError`] is the top-level error type that wraps all possible
//! failure modes during startup and shutdown.

/// Top-level error for the server binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: citywatch_core::config::ConfigError,
    },

    /// The engine could not subscribe to the channel adapter.
    #[error("channel error: {source}")]
    Channel {
        /// The underlying adapter error.
        #[from]
        source: citywatch_core::channel::ChannelError,
    },

    /// Observer API server failed to bind or stopped serving.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying startup error.
        #[from]
        source: citywatch_observer::startup::StartupError,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal error: {source}")]
    Signal {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
