//! Pulse Test - Shared test utilities for the Pulse metrics client.
//!
//! This crate provides a scriptable transport, a manual clock and fixtures
//! that can be used across Pulse crates as a dev-dependency.
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! pulse-test.workspace = true
//! ```
//!
//! Then drive a client from a test:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pulse_client::{ConnectionConfig, MetricsClient};
//! use pulse_test::{MockTransport, sample_metrics};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_data_flows() {
//!     let transport = MockTransport::new();
//!     let client = MetricsClient::new(ConnectionConfig::default(), transport.clone()).unwrap();
//!
//!     let session = transport.wait_for_session(0).await;
//!     session.open();
//!     session.metrics(sample_metrics(1_000));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod clock;
pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use clock::*;
pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
