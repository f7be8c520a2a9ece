//! Shared error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to encode or decode a wire envelope.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error body returned by the chat backend's HTTP endpoints (`{"message": ...}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub message: String,
}

/// Attempt to parse an error JSON body into a user-facing message.
pub fn try_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    let message = parsed.message.trim();
    if message.is_empty() {
        None
    } else {
        Some(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_message_field() {
        assert_eq!(
            try_error_message(r#"{"message":"file too large"}"#).as_deref(),
            Some("file too large")
        );
    }

    #[test]
    fn ignores_blank_or_foreign_bodies() {
        assert_eq!(try_error_message(r#"{"message":"  "}"#), None);
        assert_eq!(try_error_message("<html>502</html>"), None);
    }
}
