//! Connection configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// A transport kind the stream may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Persistent `WebSocket` connection.
    WebSocket,
    /// HTTP long-polling.
    Polling,
}

impl TransportKind {
    /// Lowercase name, as written in configuration files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Polling => "polling",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable connection parameters, fixed at client construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Server address, e.g. `http://localhost:3000`.
    pub endpoint: String,
    /// Logical channel (namespace) on the server.
    pub channel: String,
    /// Request path of the stream endpoint.
    pub path: String,
    /// Allowed transport kinds, in preference order.
    pub transports: Vec<TransportKind>,
    /// Whether dropped connections are retried automatically.
    pub reconnection: bool,
    /// Base retry delay; attempt `n` waits `n * reconnection_delay`.
    pub reconnection_delay: Duration,
    /// Ceiling for the retry delay.
    pub reconnection_delay_max: Duration,
    /// Consecutive retries allowed before giving up.
    pub reconnection_attempts: u32,
    /// Connect timeout for one transport open.
    pub timeout: Duration,
    /// Open the stream as soon as the client is built.
    pub auto_connect: bool,
    /// Re-publish the last known record to data listeners after every
    /// successful (re)connect.
    pub replay_last_on_connect: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000".to_string(),
            channel: "metrics".to_string(),
            path: "/socket.io".to_string(),
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            reconnection: true,
            reconnection_delay: Duration::from_millis(1000),
            reconnection_delay_max: Duration::from_millis(5000),
            reconnection_attempts: 5,
            timeout: Duration::from_millis(10_000),
            auto_connect: true,
            replay_last_on_connect: true,
        }
    }
}

impl ConnectionConfig {
    /// Defaults pointed at `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Set the channel.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Set the retry parameters.
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, delay: Duration, delay_max: Duration) -> Self {
        self.reconnection_attempts = attempts;
        self.reconnection_delay = delay;
        self.reconnection_delay_max = delay_max;
        self
    }

    /// Disable automatic connect on construction.
    #[must_use]
    pub fn manual_connect(mut self) -> Self {
        self.auto_connect = false;
        self
    }

    /// The address the stream is opened against: `endpoint/channel`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), self.channel)
    }

    /// Check the parameters a transport cannot work without.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), ClientError> {
        let parsed = url::Url::parse(&self.endpoint).map_err(|e| ClientError::InvalidConfig {
            field: "endpoint",
            message: format!("'{}' is not a valid URL: {e}", self.endpoint),
        })?;
        if !matches!(parsed.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(ClientError::InvalidConfig {
                field: "endpoint",
                message: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        if self.channel.trim().is_empty() {
            return Err(ClientError::InvalidConfig {
                field: "channel",
                message: "must not be empty".to_string(),
            });
        }
        if self.transports.is_empty() {
            return Err(ClientError::InvalidConfig {
                field: "transports",
                message: "at least one transport kind is required".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ClientError::InvalidConfig {
                field: "timeout",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.reconnection_delay > self.reconnection_delay_max {
            return Err(ClientError::InvalidConfig {
                field: "reconnection_delay",
                message: "must not exceed reconnection_delay_max".to_string(),
            });
        }
        Ok(())
    }
}
