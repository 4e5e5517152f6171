//! Error types surfaced by the hub, the broadcaster, and admission.
//!
//! Transport failures and slow consumers are not errors here: they are
//! resolved locally by tearing the affected connection down.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// The hub coordinator is not running.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// The control channel is closed (the hub stopped, usually on shutdown).
    #[error("hub coordinator is not running")]
    Closed,
}

/// Failure to publish a notification.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// The envelope could not be encoded. Nothing was enqueued.
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The hub could not accept the broadcast.
    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Rejection of a connection attempt before it reaches the hub.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// No channel ID in the request path.
    #[error("channel id is required")]
    MissingChannel,
    /// No token supplied.
    #[error("authentication token is required")]
    MissingToken,
    /// The token failed validation.
    #[error("invalid authentication token: {0}")]
    InvalidToken(String),
    /// The user may not subscribe to this channel.
    #[error("no access to this channel")]
    Forbidden,
    /// The access check itself failed.
    #[error("admission check failed: {0}")]
    Unavailable(String),
}

impl AdmissionError {
    /// HTTP status returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingChannel => StatusCode::BAD_REQUEST,
            Self::MissingToken | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
