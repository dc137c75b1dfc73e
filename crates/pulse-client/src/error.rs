//! Error types for the metrics client.

use pulse_events::RecordError;

/// Errors raised while building a client.
///
/// Nothing after construction returns an error: connection failures become
/// status and error events instead.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A configuration field is unusable.
    #[error("invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The client was built outside a Tokio runtime.
    #[error("metrics client requires a Tokio runtime")]
    NoRuntime,
}

/// Errors produced at the transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// `WebSocket` transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An inbound record could not be interpreted.
    #[error("invalid record: {0}")]
    Record(#[from] RecordError),

    /// The stream address could not be turned into a URL.
    #[error("invalid stream URL: {0}")]
    InvalidUrl(String),

    /// None of the configured transport kinds is supported.
    #[error("no supported transport among {0}")]
    UnsupportedTransport(String),

    /// The connect did not complete within the configured timeout.
    #[error("connect timed out after {0} ms")]
    Timeout(u128),

    /// The session is closed and cannot carry frames.
    #[error("transport session closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = ClientError::InvalidConfig {
            field: "channel",
            message: "must not be empty".into(),
        };
        assert!(err.to_string().contains("channel"));

        let err = TransportError::Timeout(10_000);
        assert!(err.to_string().contains("10000"));

        let err = TransportError::UnsupportedTransport("[polling]".into());
        assert!(err.to_string().contains("polling"));

        assert!(TransportError::Closed.to_string().contains("closed"));
    }

    #[test]
    fn record_error_converts() {
        let err: TransportError = RecordError::MissingTimestamp.into();
        assert!(matches!(err, TransportError::Record(_)));
    }
}
