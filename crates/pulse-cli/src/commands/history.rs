//! `pulse history`: fetch one batch of historical metrics.

use std::io::Write;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use pulse_client::{HistoryWindow, MetricsClient};
use pulse_config::Config;
use pulse_events::{ClientEvent, EventKind};
use tracing::debug;

use crate::config_bridge;
use crate::format::{OutputFormat, render_event};

/// Connect, request `window` and print the first batch that arrives.
pub(crate) async fn run_history(
    config: &Config,
    window: &HistoryWindow,
    wait: Duration,
    format: OutputFormat,
) -> Result<()> {
    let connection = config_bridge::to_connection_config(config)?.manual_connect();
    let client = MetricsClient::websocket(connection)?;
    let mut stdout = std::io::stdout().lock();
    fetch(&client, window, wait, format, &mut stdout).await
}

async fn fetch<W: Write>(
    client: &MetricsClient,
    window: &HistoryWindow,
    wait: Duration,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    let result = tokio::time::timeout(wait, first_batch(client, window)).await;
    client.destroy().await;

    let batch = result.map_err(|_| anyhow!("no history within {}s", wait.as_secs()))??;
    writeln!(out, "{}", render_event(&batch, format))?;
    Ok(())
}

async fn first_batch(
    client: &MetricsClient,
    window: &HistoryWindow,
) -> Result<std::sync::Arc<ClientEvent>> {
    let mut events = client
        .events()
        .receiver([EventKind::ConnectionChange, EventKind::History])
        .await;
    client.connect();

    while let Some(event) = events.recv().await {
        match event.as_ref() {
            ClientEvent::ConnectionChange(status) if status.connected => {
                debug!(
                    duration = %window.duration,
                    interval = %window.interval,
                    "Requesting history"
                );
                client.request_history(window);
            },
            ClientEvent::ConnectionChange(status) if status.is_exhausted() => {
                bail!("could not reach {}", client.config().address());
            },
            ClientEvent::History(_) => return Ok(event),
            _ => {},
        }
    }
    bail!("client closed before history arrived")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_client::{ConnectionConfig, REQUEST_HISTORY};
    use pulse_test::{BASE_TIMESTAMP, MockTransport, init_test_tracing, sample_history};

    fn mock_client(config: ConnectionConfig) -> (MetricsClient, std::sync::Arc<MockTransport>) {
        init_test_tracing();
        let transport = MockTransport::new();
        let client = MetricsClient::new(config.manual_connect(), transport.clone()).unwrap();
        (client, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn prints_the_first_batch() {
        let (client, transport) = mock_client(ConnectionConfig::default());
        let window = HistoryWindow::new("15m", "30s");
        let mut out = Vec::new();

        let server = async {
            let session = transport.wait_for_session(0).await;
            session.open();
            tokio::time::sleep(Duration::from_millis(10)).await;
            let sent = session.sent();
            assert_eq!(sent[0].event, REQUEST_HISTORY);
            assert_eq!(sent[0].data["duration"], "15m");
            assert_eq!(sent[0].data["interval"], "30s");
            session.history(sample_history(BASE_TIMESTAMP, 30_000, 2));
        };
        let (result, ()) = tokio::join!(
            fetch(&client, &window, Duration::from_secs(30), OutputFormat::Json, &mut out),
            server
        );
        result.unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["event"], "history");
        assert_eq!(value["data"].as_array().unwrap().len(), 2);
        assert!(client.is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_wait() {
        let (client, transport) = mock_client(ConnectionConfig::default());
        let mut out = Vec::new();

        let server = async {
            transport.wait_for_session(0).await.open();
        };
        let window = HistoryWindow::default();
        let (result, ()) = tokio::join!(
            fetch(
                &client,
                &window,
                Duration::from_secs(5),
                OutputFormat::Pretty,
                &mut out
            ),
            server
        );

        let err = result.unwrap_err();
        assert!(err.to_string().contains("no history within 5s"));
        assert!(out.is_empty());
        assert!(client.is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_server_is_an_error() {
        let config = ConnectionConfig::default().with_retry(
            1,
            Duration::from_millis(10),
            Duration::from_millis(10),
        );
        let (client, transport) = mock_client(config);
        let mut out = Vec::new();

        let server = async {
            transport.wait_for_session(0).await.fail("connection refused");
            transport.wait_for_session(1).await.fail("connection refused");
        };
        let window = HistoryWindow::default();
        let (result, ()) = tokio::join!(
            fetch(
                &client,
                &window,
                Duration::from_secs(30),
                OutputFormat::Pretty,
                &mut out
            ),
            server
        );

        assert!(result.unwrap_err().to_string().contains("could not reach"));
    }
}
