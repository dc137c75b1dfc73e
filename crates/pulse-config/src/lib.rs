#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Layered configuration for the Pulse metrics client.
//!
//! A single [`Config`] covers the stream connection, the stale-data
//! watchdog and logging.
//!
//! # Usage
//!
//! ```rust,no_run
//! use pulse_config::Config;
//!
//! let resolved = Config::load(None).unwrap();
//! println!("Streaming from {}", resolved.config.connection.endpoint);
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Explicit file** (`--config <path>`)
//! 2. **User** (`~/.pulse/config.toml`)
//! 3. **Environment variables** (`PULSE_*`), fallback only
//! 4. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! # Design
//!
//! This crate has no dependencies on other Pulse crates. Conversion into
//! client and logging types happens in the CLI's bridge module.

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layer tracking for merged values.
pub mod merge;
/// Resolved configuration display.
pub mod show;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use merge::{ConfigLayer, FieldSources};
pub use show::{ResolvedConfig, ShowFormat};
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// `explicit` is a file named on the command line; it must exist.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is unreadable or
    /// malformed, or the merged configuration fails validation.
    pub fn load(explicit: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(explicit, None)
    }

    /// Load configuration with `pulse_home` standing in for `~/.pulse`.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_with_home(
        explicit: Option<&std::path::Path>,
        pulse_home: &std::path::Path,
    ) -> ConfigResult<ResolvedConfig> {
        loader::load(explicit, Some(pulse_home))
    }

    /// Load configuration from a single file (no layering).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
