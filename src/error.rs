//! Transport error taxonomy.
//!
//! Only genuinely unexpected conditions are errors here. "Server predates
//! job-based sync" (404 on start) and "server no longer knows the job"
//! (404 on status) are modeled as outcome variants on the transport calls
//! instead; see [`crate::transport`].

use thiserror::Error;

/// Errors surfaced by the sync transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, DNS, or timeout failure before a usable response.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with an unexpected status code.
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}
