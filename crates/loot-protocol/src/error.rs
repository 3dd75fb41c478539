//! Error types for decoding protocol messages.

/// Errors raised while decoding a wire message.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("message carries none of `error`, `result` or `log`")]
    Empty,

    #[error("message carries more than one of `error`, `result` or `log`: {0:?}")]
    Ambiguous(Vec<&'static str>),

    #[error("invalid `{field}` field: {reason}")]
    InvalidField { field: &'static str, reason: String },
}
