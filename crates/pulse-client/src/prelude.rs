//! Prelude module - commonly used types for convenient import.
//!
//! Use `use pulse_client::prelude::*;` to import all essential types.

// Client
pub use crate::{ConnectionConfig, ConnectionState, HistoryWindow, MetricsClient};

// Transport
pub use crate::{Transport, TransportEvent, TransportSession, WebSocketTransport};

// Re-exported event types consumers need alongside the client
pub use pulse_events::{ClientEvent, ConnectionStatus, EventKind, MetricsRecord};
