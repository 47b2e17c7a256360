//! Crate error types.

use thiserror::Error;

use crate::state::SeatKey;

/// Errors from configuration, endpoint construction and transport I/O.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),

    #[error("endpoint url cannot carry path segments: {0}")]
    EndpointBase(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// A user intent rejected before anything was sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error("Not connected")]
    NotConnected,

    #[error("Seat {0} is not available")]
    SeatUnavailable(SeatKey),

    #[error("You must take a seat first")]
    NotSeated,

    #[error("It is not your turn to move")]
    NotYourTurn,
}
