//! Prelude module - commonly used types for convenient import.
//!
//! Use `use pulse_test::prelude::*;` to import all essential types.

pub use crate::clock::*;
pub use crate::fixtures::*;
pub use crate::harness::*;
pub use crate::mocks::*;
