//! Prelude module - commonly used types for convenient import.
//!
//! Use `use pulse_events::prelude::*;` to import all essential types.

// Dispatcher
pub use crate::{EventDispatcher, EventReceiver, SubscriptionId};

// Events
pub use crate::{ClientEvent, EventKind};

// Records
pub use crate::{ConnectionStatus, MetricsRecord, StreamError, SystemMetrics};
