//! Configuration types.
//!
//! Every struct implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a bare `[section]` header produces a working
//! configuration. Durations are plain millisecond integers to keep the TOML
//! readable.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Stream endpoint and retry behaviour.
    pub connection: ConnectionSection,
    /// Stale-data detection.
    pub watchdog: WatchdogSection,
    /// Logging level, format and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// ConnectionSection
// ---------------------------------------------------------------------------

/// Where to stream from and how to recover from drops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    /// Server address (`http`, `https`, `ws` or `wss`).
    pub endpoint: String,
    /// Logical channel on the server.
    pub channel: String,
    /// Request path of the stream endpoint.
    pub path: String,
    /// Allowed transports in preference order (`"websocket"`, `"polling"`).
    pub transports: Vec<String>,
    /// Retry dropped connections automatically.
    pub reconnection: bool,
    /// Base retry delay in milliseconds.
    pub reconnection_delay_ms: u64,
    /// Retry delay ceiling in milliseconds.
    pub reconnection_delay_max_ms: u64,
    /// Consecutive retries before giving up.
    pub reconnection_attempts: u32,
    /// Connect timeout in milliseconds.
    pub timeout_ms: u64,
    /// Connect as soon as the client is built.
    pub auto_connect: bool,
    /// Re-publish the last record after every reconnect.
    pub replay_last_on_connect: bool,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000".to_owned(),
            channel: "metrics".to_owned(),
            path: "/socket.io".to_owned(),
            transports: vec!["websocket".to_owned(), "polling".to_owned()],
            reconnection: true,
            reconnection_delay_ms: 1000,
            reconnection_delay_max_ms: 5000,
            reconnection_attempts: 5,
            timeout_ms: 10_000,
            auto_connect: true,
            replay_last_on_connect: true,
        }
    }
}

// ---------------------------------------------------------------------------
// WatchdogSection
// ---------------------------------------------------------------------------

/// Stale-data watchdog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogSection {
    /// Start the watchdog with the stream.
    pub enabled: bool,
    /// Maximum record age in milliseconds before a forced reconnect.
    pub timeout_ms: u64,
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 30_000,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["pulse_client=debug"]`).
    pub directives: Vec<String>,
    /// Write logs to rolling files in this directory instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
            directory: None,
        }
    }
}
