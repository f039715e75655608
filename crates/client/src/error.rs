//! Error types for the client crate.
//!
//! None of these cross the connection manager's runtime operations; they
//! surface only when building a manager or loading configuration.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures of the underlying transport. Logged, then fed into the
/// reconnect path.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Like `From`, but folds tungstenite's "already closed" reports into
    /// [`TransportError::Closed`].
    pub(crate) fn from_socket(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::Closed
            }
            other => TransportError::WebSocket(other),
        }
    }
}

/// Errors raised while constructing a client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The manager spawns its driver and timer tasks on tokio.
    #[error("no tokio runtime is running")]
    NoRuntime,

    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
