//! Shared helpers for client integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pulse_client::{ConnectionConfig, ConnectionState, MetricsClient};
use pulse_events::{ConnectionStatus, MetricsRecord};
use pulse_test::MockTransport;

/// Milliseconds as a `Duration`.
#[allow(dead_code)]
pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Let every ready task run to idle.
///
/// Under paused time the runtime only advances the clock once nothing else
/// can make progress, so a short sleep doubles as a barrier.
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(ms(1)).await;
}

/// Wait until the client reaches `state`.
#[allow(dead_code)]
pub async fn wait_state(client: &MetricsClient, state: ConnectionState) {
    let mut changes = client.state_changes();
    changes
        .wait_for(|s| *s == state)
        .await
        .expect("client state channel closed");
}

/// A client over a fresh mock transport.
#[allow(dead_code)]
pub fn mock_client(config: ConnectionConfig) -> (MetricsClient, Arc<MockTransport>) {
    pulse_test::init_test_tracing();
    let transport = MockTransport::new();
    let client = MetricsClient::new(config, transport.clone()).expect("client builds");
    (client, transport)
}

/// Collect every connection status the client publishes.
#[allow(dead_code)]
pub fn record_statuses(client: &MetricsClient) -> Arc<Mutex<Vec<ConnectionStatus>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    client.events().on_connection_change(move |status| {
        sink.lock().unwrap().push(status.clone());
    });
    log
}

/// Collect the timestamp of every record delivered to data listeners.
#[allow(dead_code)]
pub fn record_data(client: &MetricsClient) -> Arc<Mutex<Vec<i64>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    client.events().on_data(move |record: &MetricsRecord| {
        sink.lock().unwrap().push(record.timestamp());
    });
    log
}

/// Statuses carrying `reason`.
#[allow(dead_code)]
pub fn with_reason(log: &Mutex<Vec<ConnectionStatus>>, reason: &str) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|s| s.reason.as_deref() == Some(reason))
        .count()
}
