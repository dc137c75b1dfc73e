//! Post-merge configuration validation.
//!
//! Checks that deserialized [`Config`](crate::Config) values are within
//! acceptable ranges and that cross-field invariants hold.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_connection(config)?;
    validate_watchdog(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_connection(config: &Config) -> ConfigResult<()> {
    let c = &config.connection;

    let Some((scheme, rest)) = c.endpoint.split_once("://") else {
        return Err(invalid(
            "connection.endpoint",
            format!("'{}' is not a URL", c.endpoint),
        ));
    };
    if !matches!(scheme, "http" | "https" | "ws" | "wss") {
        return Err(invalid(
            "connection.endpoint",
            format!("unsupported scheme '{scheme}'; expected one of: http, https, ws, wss"),
        ));
    }
    if rest.trim().is_empty() {
        return Err(invalid("connection.endpoint", "missing host"));
    }

    if c.channel.trim().is_empty() {
        return Err(invalid("connection.channel", "must not be empty"));
    }

    if !c.path.starts_with('/') {
        return Err(invalid(
            "connection.path",
            format!("'{}' must start with '/'", c.path),
        ));
    }

    if c.transports.is_empty() {
        return Err(invalid(
            "connection.transports",
            "at least one transport is required",
        ));
    }
    if let Some(other) = c
        .transports
        .iter()
        .find(|t| !matches!(t.as_str(), "websocket" | "polling"))
    {
        return Err(invalid(
            "connection.transports",
            format!("unknown transport '{other}'; expected websocket or polling"),
        ));
    }

    if c.reconnection_delay_ms > c.reconnection_delay_max_ms {
        return Err(invalid(
            "connection.reconnection_delay_ms",
            format!(
                "base delay {} exceeds reconnection_delay_max_ms {}",
                c.reconnection_delay_ms, c.reconnection_delay_max_ms
            ),
        ));
    }

    if c.timeout_ms == 0 {
        return Err(invalid("connection.timeout_ms", "must be greater than zero"));
    }

    Ok(())
}

fn validate_watchdog(config: &Config) -> ConfigResult<()> {
    if config.watchdog.timeout_ms == 0 {
        return Err(invalid("watchdog.timeout_ms", "must be greater than zero"));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(config: &Config) -> String {
        match validate(config).unwrap_err() {
            ConfigError::ValidationError { field, .. } => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let mut config = Config::default();
        config.connection.endpoint = "ftp://host".to_owned();
        assert_eq!(field_of(&config), "connection.endpoint");

        config.connection.endpoint = "localhost:3000".to_owned();
        assert_eq!(field_of(&config), "connection.endpoint");
    }

    #[test]
    fn test_accepts_ws_schemes() {
        let mut config = Config::default();
        config.connection.endpoint = "wss://metrics.example.com".to_owned();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_empty_channel() {
        let mut config = Config::default();
        config.connection.channel = "  ".to_owned();
        assert_eq!(field_of(&config), "connection.channel");
    }

    #[test]
    fn test_rejects_relative_path() {
        let mut config = Config::default();
        config.connection.path = "socket.io".to_owned();
        assert_eq!(field_of(&config), "connection.path");
    }

    #[test]
    fn test_rejects_transports() {
        let mut config = Config::default();
        config.connection.transports.clear();
        assert_eq!(field_of(&config), "connection.transports");

        config.connection.transports = vec!["carrier-pigeon".to_owned()];
        assert_eq!(field_of(&config), "connection.transports");
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let mut config = Config::default();
        config.connection.reconnection_delay_ms = 10_000;
        assert_eq!(field_of(&config), "connection.reconnection_delay_ms");
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let mut config = Config::default();
        config.connection.timeout_ms = 0;
        assert_eq!(field_of(&config), "connection.timeout_ms");

        let mut config = Config::default();
        config.watchdog.timeout_ms = 0;
        assert_eq!(field_of(&config), "watchdog.timeout_ms");
    }

    #[test]
    fn test_rejects_unknown_log_level_and_format() {
        let mut config = Config::default();
        config.logging.level = "loud".to_owned();
        assert_eq!(field_of(&config), "logging.level");

        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        assert_eq!(field_of(&config), "logging.format");
    }
}
