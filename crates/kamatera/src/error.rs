//! Error types for the Kamatera API client.

use thiserror::Error;

/// Errors that can occur when talking to the Kamatera API.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request body could not be serialized. Never retried.
    #[error("Malformed request body: {0}")]
    MalformedRequest(#[source] serde_json::Error),

    /// Connection or transport failure.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-200 response whose body could not be decoded.
    #[error("bad status code from Kamatera API: {status}")]
    BadStatus { status: u16 },

    /// 200 response whose body could not be decoded.
    #[error("invalid response from Kamatera API: {source}")]
    BadPayload {
        #[source]
        source: serde_json::Error,
    },

    /// Decodable error response.
    #[error("error response from Kamatera API ({status}): {message}")]
    Api { status: u16, message: String },

    /// The lookup matched more than one server.
    #[error("expected one server info, got {0}")]
    AmbiguousServerState(usize),

    /// The server info record did not have the expected shape.
    #[error("invalid server info format: {0}")]
    InvalidServerInfoFormat(String),

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ProviderError {
    /// Whether the request loop should try again after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::BadStatus { .. } | Self::BadPayload { .. } | Self::Api { .. }
        )
    }
}
