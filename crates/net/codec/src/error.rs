//! Decode errors for inbound envelopes.

/// Why an inbound payload could not be turned into an envelope.
///
/// Always recoverable: the receiver logs it and drops the message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Payload bytes are not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    /// Payload is not a JSON object.
    #[error("malformed envelope: {0}")]
    Malformed(String),
    /// A required field is absent.
    #[error("envelope is missing field `{0}`")]
    MissingField(&'static str),
    /// A field is present but not a string.
    #[error("envelope field `{0}` must be a string")]
    InvalidField(&'static str),
}

impl From<serde_json::Error> for DecodeError {
    fn from(error: serde_json::Error) -> Self {
        DecodeError::Malformed(error.to_string())
    }
}
