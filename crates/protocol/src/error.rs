/// Errors decoding hub records and event payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("frame type {kind} is missing `{field}`")]
    MissingField { kind: u8, field: &'static str },

    #[error("unknown hub method: {0}")]
    UnknownTarget(String),

    #[error("bad arguments for {target}: {reason}")]
    BadArguments { target: String, reason: String },
}
