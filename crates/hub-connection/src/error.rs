//! Error types surfaced by the connection manager.

use crate::ws_client::WsError;

/// Failure of an explicit connect attempt.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("invalid hub endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("no bearer token available")]
    MissingToken,

    #[error("connect aborted by disconnect")]
    Aborted,

    #[error("hub connection failed: {0}")]
    Transport(#[from] WsError),
}

/// Failure of an outbound action.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// No connection has ever succeeded in this session.
    #[error("not connected to the hub")]
    NotConnected,

    /// The hub call failed on a live (or freshly re-established) connection.
    #[error("hub invocation failed: {0}")]
    InvokeFailed(#[source] WsError),
}
