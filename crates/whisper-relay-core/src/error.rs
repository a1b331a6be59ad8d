//! Error taxonomy shared by the gateway, the producer and the streaming client.

use thiserror::Error;

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can occur anywhere in the relay pipeline.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Missing or invalid language/task/beam size. Raised before any resource is allocated.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// The engine was never initialised (or failed to load at startup).
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Decode error from the engine, possibly after some segments were produced.
    #[error("Engine failure: {0}")]
    EngineFailure(String),

    /// Connection dropped, bad handshake, non-success status or timeout.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// A wire record that could not be parsed. Skipped by the client, never surfaced.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// True for errors that are rejected before a stream is opened.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RelayError::InvalidOptions(_) | RelayError::EngineUnavailable(_)
        )
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::MalformedRecord(err.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::TransportFailure(err.to_string())
    }
}
