//! Event kinds and their payloads.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::record::{ConnectionStatus, MetricsRecord, StreamError};

/// The closed set of events a client emits.
///
/// Each variant carries the one payload type its kind allows, so a
/// `Data` listener can never receive a status record.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Connection went up or down.
    ConnectionChange(ConnectionStatus),
    /// A metrics record arrived (or was replayed after a reconnect).
    Data(Arc<MetricsRecord>),
    /// A batch of historical records arrived.
    History(Arc<Vec<MetricsRecord>>),
    /// The transport reported an error.
    Error(StreamError),
    /// Raw transport open.
    Connect,
    /// Raw transport close.
    Disconnect {
        /// Close reason reported by the transport.
        reason: String,
    },
}

impl ClientEvent {
    /// The kind this event is routed under.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ConnectionChange(_) => EventKind::ConnectionChange,
            Self::Data(_) => EventKind::Data,
            Self::History(_) => EventKind::History,
            Self::Error(_) => EventKind::Error,
            Self::Connect => EventKind::Connect,
            Self::Disconnect { .. } => EventKind::Disconnect,
        }
    }
}

/// Routing key for listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// [`ClientEvent::ConnectionChange`].
    ConnectionChange,
    /// [`ClientEvent::Data`].
    Data,
    /// [`ClientEvent::History`].
    History,
    /// [`ClientEvent::Error`].
    Error,
    /// [`ClientEvent::Connect`].
    Connect,
    /// [`ClientEvent::Disconnect`].
    Disconnect,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::ConnectionChange,
        Self::Data,
        Self::History,
        Self::Error,
        Self::Connect,
        Self::Disconnect,
    ];

    /// Stable name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionChange => "connection-change",
            Self::Data => "data",
            Self::History => "history",
            Self::Error => "error",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
