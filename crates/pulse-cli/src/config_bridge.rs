//! Bridge from `pulse_config::Config` to client and logging types.
//!
//! The config crate stays free of Pulse dependencies; this module is the only
//! place that knows both sides.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use pulse_client::{ConnectionConfig, TransportKind};
use pulse_config::Config;
use pulse_telemetry::{FileRotation, LogConfig, LogFormat, LogTarget};
use tracing::warn;

fn transport_kind(name: &str) -> Result<TransportKind> {
    match name.trim().to_ascii_lowercase().as_str() {
        "websocket" => Ok(TransportKind::WebSocket),
        "polling" => Ok(TransportKind::Polling),
        other => bail!("unknown transport '{other}'"),
    }
}

/// Convert the `[connection]` section into client parameters.
///
/// # Errors
///
/// Returns an error if a transport name is not recognized.
pub(crate) fn to_connection_config(config: &Config) -> Result<ConnectionConfig> {
    let c = &config.connection;
    let transports = c
        .transports
        .iter()
        .map(|name| transport_kind(name))
        .collect::<Result<Vec<_>>>()?;

    Ok(ConnectionConfig {
        endpoint: c.endpoint.clone(),
        channel: c.channel.clone(),
        path: c.path.clone(),
        transports,
        reconnection: c.reconnection,
        reconnection_delay: Duration::from_millis(c.reconnection_delay_ms),
        reconnection_delay_max: Duration::from_millis(c.reconnection_delay_max_ms),
        reconnection_attempts: c.reconnection_attempts,
        timeout: Duration::from_millis(c.timeout_ms),
        auto_connect: c.auto_connect,
        replay_last_on_connect: c.replay_last_on_connect,
    })
}

/// The configured watchdog timeout, or `None` when the watchdog is off.
pub(crate) fn watchdog_timeout(config: &Config) -> Option<Duration> {
    config
        .watchdog
        .enabled
        .then(|| Duration::from_millis(config.watchdog.timeout_ms))
}

/// Convert the `[logging]` section into a telemetry config.
///
/// An unknown format falls back to compact output.
pub(crate) fn to_log_config(config: &Config) -> LogConfig {
    let l = &config.logging;
    let format = l.format.parse::<LogFormat>().unwrap_or_else(|e| {
        warn!(error = %e, "Falling back to compact log format");
        LogFormat::Compact
    });

    let mut log = LogConfig::new(l.level.clone()).with_format(format);
    for directive in &l.directives {
        log = log.with_directive(directive.clone());
    }
    if let Some(dir) = &l.directory {
        log = log.with_file_logging(PathBuf::from(dir), FileRotation::Daily);
    } else {
        log = log.with_target(LogTarget::Stderr);
    }
    log
}
