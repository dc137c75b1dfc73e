//! Pulse Client - Auto-reconnecting metrics stream client.
//!
//! This crate provides:
//! - [`MetricsClient`], the connection manager: owns one transport session,
//!   drives the lifecycle state machine and publishes everything through a
//!   [`pulse_events::EventDispatcher`]
//! - [`ReconnectionPolicy`], linear capped backoff with a retry limit
//! - A stale-data watchdog that forces a reconnect when a connected stream
//!   goes silent
//! - The [`Transport`] boundary and a `WebSocket` implementation
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use pulse_client::{ConnectionConfig, HistoryWindow, MetricsClient};
//!
//! # async fn example() -> Result<(), pulse_client::ClientError> {
//! let client = MetricsClient::websocket(ConnectionConfig::new("http://localhost:3000"))?;
//!
//! client.events().on_data(|record| {
//!     println!("sample at {}", record.timestamp());
//! });
//! client.start_connection_watchdog(Duration::from_secs(30));
//! client.request_history(&HistoryWindow::default());
//!
//! // ... later, at shutdown
//! client.destroy().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod config;
mod error;
mod manager;
mod policy;
mod protocol;
mod scheduler;
mod state;
mod transport;
mod watchdog;
mod websocket;

pub use config::{ConnectionConfig, TransportKind};
pub use error::{ClientError, TransportError};
pub use manager::{HistoryWindow, MetricsClient};
pub use policy::{ReconnectionPolicy, RetryDecision};
pub use state::ConnectionState;
pub use transport::{
    ConnectTarget, OutboundFrame, REQUEST_HISTORY, REQUEST_METRICS, SessionEvent, SessionId,
    Transport, TransportEvent, TransportSession, TransportSink,
};
pub use watchdog::{Clock, DEFAULT_WATCHDOG_TIMEOUT, SystemClock};
pub use websocket::{
    REASON_CONNECT_ERROR, REASON_SERVER_DISCONNECT, REASON_TRANSPORT_CLOSE,
    REASON_TRANSPORT_ERROR, WebSocketTransport, stream_url,
};
