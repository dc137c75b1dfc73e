//! The boundary between the connection manager and a concrete transport.
//!
//! A [`Transport`] opens sessions. Each session reports its lifecycle and
//! inbound data through the [`TransportSink`] it was handed at open time,
//! tagged with the session's id, so the manager can tell a live session's
//! events from those of one it has already abandoned.

use std::fmt;
use std::time::Duration;

use pulse_events::MetricsRecord;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::{ConnectionConfig, TransportKind};
use crate::error::TransportError;

/// Outbound event asking for a history window.
pub const REQUEST_HISTORY: &str = "request-history";

/// Outbound event asking for the current metrics.
pub const REQUEST_METRICS: &str = "request-metrics";

/// Identity of one transport session within a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw id.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a transport needs to open one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Server address, e.g. `http://localhost:3000`.
    pub endpoint: String,
    /// Logical channel on the server.
    pub channel: String,
    /// Request path.
    pub path: String,
    /// Allowed transport kinds, in preference order.
    pub transports: Vec<TransportKind>,
    /// Connect timeout.
    pub timeout: Duration,
}

impl From<&ConnectionConfig> for ConnectTarget {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            channel: config.channel.clone(),
            path: config.path.clone(),
            transports: config.transports.clone(),
            timeout: config.timeout,
        }
    }
}

/// Lifecycle and data notifications from a session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The session is open.
    Connected,
    /// The session closed.
    Disconnected {
        /// Why it closed.
        reason: String,
    },
    /// Opening failed.
    ConnectError {
        /// Failure description.
        message: String,
    },
    /// A live record.
    Metrics(MetricsRecord),
    /// A batch of historical records.
    MetricsHistory(Vec<MetricsRecord>),
    /// The transport is making its own retry attempt `n`.
    ReconnectAttempt(u32),
    /// The transport's own retry succeeded after `n` attempts.
    Reconnected(u32),
    /// The transport's own retries are exhausted.
    ReconnectFailed,
}

/// A session event tagged with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    /// Emitting session.
    pub session: SessionId,
    /// What happened.
    pub event: TransportEvent,
}

/// Where a session reports to. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TransportSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl TransportSink {
    /// Create a sink for `session`.
    #[must_use]
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    /// The session this sink reports for.
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Report an event. Returns `false` once the client has gone away.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SessionEvent {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

/// An outbound, fire-and-forget event.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundFrame {
    /// Event name.
    pub event: String,
    /// Payload; `Null` when the event carries none.
    pub data: Value,
}

impl OutboundFrame {
    /// Build a frame.
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Opens sessions.
pub trait Transport: Send + Sync {
    /// Start opening a session.
    ///
    /// Must return without waiting for the network. Progress is reported
    /// through `sink`: `Connected` on success, or `ConnectError` followed by
    /// `Disconnected` on failure.
    fn open(&self, target: ConnectTarget, sink: TransportSink) -> Box<dyn TransportSession>;
}

/// A handle to one open (or opening) session.
pub trait TransportSession: Send {
    /// Queue a frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the session can no longer send.
    fn send(&self, frame: OutboundFrame) -> Result<(), TransportError>;

    /// Close the session. After this the session emits nothing further.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_tags_events_with_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = TransportSink::new(SessionId::new(7), tx);
        assert!(sink.emit(TransportEvent::Connected));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.session.get(), 7);
        assert_eq!(event.event, TransportEvent::Connected);
    }

    #[test]
    fn sink_reports_closed_client() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = TransportSink::new(SessionId::new(1), tx);
        drop(rx);
        assert!(!sink.emit(TransportEvent::ReconnectFailed));
    }

    #[test]
    fn target_from_config() {
        let config = ConnectionConfig::default();
        let target = ConnectTarget::from(&config);
        assert_eq!(target.channel, "metrics");
        assert_eq!(target.timeout, Duration::from_secs(10));
    }
}
