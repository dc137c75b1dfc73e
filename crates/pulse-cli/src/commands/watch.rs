//! `pulse watch`: stream live metrics until interrupted.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use pulse_client::{HistoryWindow, MetricsClient};
use pulse_config::Config;
use pulse_events::{ClientEvent, EventKind};
use tracing::info;

use crate::config_bridge;
use crate::format::{OutputFormat, render_event};
use crate::status::StatusTracker;
use crate::theme::Theme;

/// Resolved `watch` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WatchOptions {
    /// Stale-data timeout, `None` to run without the watchdog.
    pub(crate) watchdog: Option<Duration>,
    /// History to request on the first connect.
    pub(crate) history: Option<HistoryWindow>,
}

impl WatchOptions {
    /// Combine command-line flags with the loaded configuration.
    ///
    /// `--watchdog 0` turns the watchdog off.
    pub(crate) fn resolve(config: &Config, watchdog_secs: Option<u64>, history: bool) -> Self {
        let watchdog = match watchdog_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => config_bridge::watchdog_timeout(config),
        };
        Self {
            watchdog,
            history: history.then(HistoryWindow::default),
        }
    }
}

/// Open the stream and print events until Ctrl-C.
pub(crate) async fn run_watch(
    config: &Config,
    options: &WatchOptions,
    format: OutputFormat,
) -> Result<()> {
    let connection = config_bridge::to_connection_config(config)?.manual_connect();
    let client = MetricsClient::websocket(connection)?;
    if format == OutputFormat::Pretty {
        eprintln!(
            "{}",
            Theme::info(&format!("Watching {}", client.config().address()))
        );
    }

    let mut stdout = std::io::stdout().lock();
    follow(&client, options, format, super::interrupted(), &mut stdout).await
}

async fn follow<W: Write>(
    client: &MetricsClient,
    options: &WatchOptions,
    format: OutputFormat,
    shutdown: impl Future<Output = ()>,
    out: &mut W,
) -> Result<()> {
    let tracker = StatusTracker::attach(client);
    let mut events = client
        .events()
        .receiver([
            EventKind::ConnectionChange,
            EventKind::Data,
            EventKind::History,
            EventKind::Error,
        ])
        .await;

    if let Some(timeout) = options.watchdog {
        client.start_connection_watchdog(timeout);
    }
    client.connect();

    let mut history_requested = false;
    let mut gave_up = false;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            () = &mut shutdown => {
                info!("Interrupted, closing stream");
                break;
            }

            event = events.recv() => {
                let Some(event) = event else { break };
                writeln!(out, "{}", render_event(&event, format))?;

                if let ClientEvent::ConnectionChange(status) = event.as_ref() {
                    if status.is_exhausted() {
                        gave_up = true;
                        break;
                    }
                    if status.connected
                        && !history_requested
                        && let Some(window) = &options.history
                    {
                        client.request_history(window);
                        history_requested = true;
                    }
                }
            }
        }
    }

    tracker.detach(client);
    if format == OutputFormat::Pretty {
        writeln!(out, "{}", Theme::separator())?;
        let stamp = |t: Option<DateTime<Utc>>| {
            t.map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
        };
        writeln!(
            out,
            "{}",
            Theme::dimmed(&format!(
                "connected: {}  last change: {}  last record: {}",
                tracker.is_connected(),
                stamp(tracker.last_update()),
                stamp(tracker.last_record()),
            ))
        )?;
    }
    let attempts = client.reconnect_attempts();
    client.destroy().await;

    if gave_up {
        bail!("stream lost after {attempts} reconnect attempts");
    }
    Ok(())
}
