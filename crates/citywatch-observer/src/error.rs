//! Error types for the Observer API server.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use citywatch_core::channel::ChannelError;
use citywatch_core::prediction::PredictionError;
use citywatch_core::validate::ValidationError;

/// Errors that can occur in the Observer API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A published payload failed validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The channel adapter could not deliver the payload.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// A prediction refresh failed; the previous set is still served.
    #[error("prediction refresh failed: {0}")]
    Prediction(#[from] PredictionError),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ObserverError {
    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Channel(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Prediction(PredictionError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Prediction(_) => StatusCode::BAD_GATEWAY,
            Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::NotFound(msg) => msg.clone(),
            Self::Serialization(e) => format!("JSON error: {e}"),
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use citywatch_types::Channel;

    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        let validation = ObserverError::Validation(ValidationError::Malformed {
            channel: Channel::Metrics,
            reason: String::from("missing field `cpu`"),
        });
        assert_eq!(validation.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let timeout = ObserverError::Prediction(PredictionError::Timeout { timeout_ms: 3000 });
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let unavailable = ObserverError::Channel(ChannelError::Unavailable {
            channel: Channel::Iot,
        });
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
