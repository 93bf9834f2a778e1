//! Error types for the wire protocol

use thiserror::Error;

/// Protocol error types
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },
}

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtoError>;
