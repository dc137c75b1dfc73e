//! Pulse Events - Typed event dispatcher for the Pulse metrics client.
//!
//! This crate provides:
//! - Value records flowing out of the stream (`MetricsRecord`,
//!   `ConnectionStatus`, `StreamError`)
//! - A closed set of event kinds with a fixed payload per kind
//! - An `EventDispatcher` that decouples the transport from consumers
//!
//! # Architecture
//!
//! Producers call `publish`, which only enqueues. A dedicated delivery task
//! owns the listener registry and invokes callbacks later, one at a time, in
//! subscription order. Every callback invocation is isolated: a panicking
//! callback is logged and the remaining callbacks still run.
//!
//! There are two ways to consume events:
//!
//! 1. **Callbacks**: `dispatcher.subscribe(kind, callback)` or one of the typed
//!    helpers such as `on_data`.
//!
//! 2. **Async receivers**: `dispatcher.receiver(kinds)` yields an
//!    `EventReceiver` that can be polled from any task.
//!
//! # Example
//!
//! ```rust
//! use pulse_events::{ConnectionStatus, ClientEvent, EventDispatcher};
//!
//! # async fn example() {
//! let dispatcher = EventDispatcher::new();
//!
//! dispatcher.on_connection_change(|status| {
//!     println!("connected: {}", status.connected);
//! });
//!
//! dispatcher.publish(ClientEvent::ConnectionChange(ConnectionStatus::up()));
//! dispatcher.flush().await;
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod dispatcher;
mod event;
mod record;

pub use dispatcher::{
    BACKLOG_WARN_THRESHOLD, BROADCAST_CAPACITY, Callback, EventDispatcher, EventReceiver, SubscriptionId,
};
pub use event::{ClientEvent, EventKind};
pub use record::{
    ConnectionStatus, CpuMetrics, DiskMetrics, MemoryMetrics, MetricsRecord, NetworkMetrics,
    REASON_DATA_TIMEOUT, REASON_MAX_RECONNECT_ATTEMPTS, RecordError, StreamError, SystemMetrics,
    now_millis,
};
