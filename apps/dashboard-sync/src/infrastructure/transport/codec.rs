//! Stream Codec
//!
//! JSON decoding of server frames and encoding of control frames.
//!
//! A text frame carries either one message object or an array of message
//! objects:
//! ```json
//! {"type": "Signal", "data": {...}}
//! [{"type": "Position", "data": {...}}, {"type": "Position", "data": {...}}]
//! ```

use crate::domain::streaming::InboundMessage;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is not a JSON object or array.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the dashboard streaming endpoint.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not valid JSON or an element lacks
    /// a `type` field.
    pub fn decode(&self, text: &str) -> Result<Vec<InboundMessage>, CodecError> {
        let trimmed = text.trim();

        if trimmed.starts_with('[') {
            Ok(serde_json::from_str(trimmed)?)
        } else if trimmed.starts_with('{') {
            Ok(vec![serde_json::from_str(trimmed)?])
        } else {
            let preview: String = trimmed.chars().take(50).collect();
            Err(CodecError::InvalidFormat(format!(
                "expected JSON object or array, got: {preview}..."
            )))
        }
    }

    /// Encode a value to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}
