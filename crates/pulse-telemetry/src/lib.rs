//! Pulse Telemetry - logging setup for the Pulse metrics client.
//!
//! Library crates only emit `tracing` events; the binary calls
//! [`setup_logging`] once at startup to decide where they go.
//!
//! # Example
//!
//! ```rust,no_run
//! use pulse_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), pulse_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("pulse_client=debug");
//!
//! let _guard = setup_logging(&config)?;
//! tracing::info!("Logging ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogGuard, LogTarget,
    setup_default_logging, setup_logging,
};
