//! Error types for stru-api

use thiserror::Error;

/// Result type alias using stru-api Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the stru services
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The byte source failed mid-stream for a reason other than HTTP
    #[error("Transport error: {0}")]
    Transport(String),

    /// A single stream line could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The user is not logged in
    #[error("Not authenticated")]
    Unauthenticated,

    /// The caller aborted before the stream opened
    #[error("Request cancelled")]
    Cancelled,
}

/// Why a `data:` line was dropped
#[derive(Error, Debug)]
pub enum DecodeError {
    /// `data:` prefix with nothing after it
    #[error("empty data payload")]
    EmptyPayload,

    /// Payload is not a well-formed tagged record
    #[error("malformed payload {payload:?}: {source}")]
    Malformed {
        payload: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Build a status error from a status code and response body
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Whether this error ends the current stream.
    ///
    /// Decode errors only drop one line; everything else is fatal for the turn.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Decode(_))
    }

    /// Check if this error is worth retrying before any bytes were streamed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            Error::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Error::Transport(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed() -> DecodeError {
        let source = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        DecodeError::Malformed {
            payload: "{nope".into(),
            source,
        }
    }

    #[test]
    fn test_decode_errors_are_not_fatal() {
        assert!(!Error::from(DecodeError::EmptyPayload).is_fatal());
        assert!(!Error::from(malformed()).is_fatal());
    }

    #[test]
    fn test_transport_errors_are_fatal() {
        assert!(Error::Transport("reset".into()).is_fatal());
        assert!(Error::status(500, "boom").is_fatal());
        assert!(Error::Unauthenticated.is_fatal());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(Error::status(429, "slow down").is_retryable());
        assert!(Error::status(502, "bad gateway").is_retryable());
        assert!(Error::status(503, "").is_retryable());
    }

    #[test]
    fn test_not_retryable_client_errors() {
        assert!(!Error::status(400, "bad request").is_retryable());
        assert!(!Error::status(401, "").is_retryable());
        assert!(!Error::Unauthenticated.is_retryable());
        assert!(!Error::from(DecodeError::EmptyPayload).is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn test_malformed_message_mentions_payload() {
        let msg = malformed().to_string();
        assert!(msg.contains("{nope"), "got: {}", msg);
    }
}
