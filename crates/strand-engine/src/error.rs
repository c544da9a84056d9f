//! Error types for strand-engine

use thiserror::Error;

/// Result type alias using strand-engine Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported to the engine by its collaborators
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the model layer
    #[error(transparent)]
    Types(#[from] strand_types::Error),

    /// The conversation store failed to persist or update something
    #[error("Sink error: {0}")]
    Sink(String),

    /// Title generation failed
    #[error("Title generation failed: {0}")]
    Title(String),

    /// The engine runner is no longer accepting commands
    #[error("Engine runner has stopped")]
    Closed,
}

impl Error {
    /// Create a sink error from any displayable cause
    pub fn sink(cause: impl std::fmt::Display) -> Self {
        Error::Sink(cause.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_error_display() {
        let err = Error::sink("disk full");
        assert_eq!(err.to_string(), "Sink error: disk full");
    }

    #[test]
    fn test_types_error_is_transparent() {
        let inner = strand_types::Error::InvalidEvent("bad".into());
        let err: Error = inner.into();
        assert_eq!(err.to_string(), "Invalid event: bad");
    }
}
