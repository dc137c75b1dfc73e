//! Connection lifecycle state.

use std::fmt;

use serde::Serialize;

/// Where the client is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session, nothing scheduled.
    #[default]
    Disconnected,
    /// A session is opening.
    Connecting,
    /// A session is open.
    Connected,
    /// Dropped; a retry is scheduled.
    Reconnecting,
    /// Retries exhausted; only a manual connect resumes.
    Failed,
}

impl ConnectionState {
    /// Lowercase name for logs and display.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
