//! Error types for strand-types

use thiserror::Error;

/// Result type alias using strand-types Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding inbound data
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The input could not be interpreted as an event at all
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_converts() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("JSON error"));
    }

    #[test]
    fn test_invalid_event_message() {
        let err = Error::InvalidEvent("not an object".into());
        assert_eq!(err.to_string(), "Invalid event: not an object");
    }
}
