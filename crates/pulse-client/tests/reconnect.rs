//! Reconnection scheduling against a scripted transport.
//!
//! Runs on paused Tokio time: retry timers fire as soon as every task is
//! idle, so measured delays are exact.

#![allow(clippy::arithmetic_side_effects)]

mod common;

use common::{mock_client, ms, record_statuses, settle, wait_state, with_reason};
use pulse_client::{ConnectionConfig, ConnectionState, REASON_TRANSPORT_CLOSE};
use pulse_events::REASON_MAX_RECONNECT_ATTEMPTS;
use pulse_test::sample_metrics;
use tokio::time::Instant;

fn three_attempts() -> ConnectionConfig {
    ConnectionConfig::default().with_retry(3, ms(1000), ms(5000))
}

#[tokio::test(start_paused = true)]
async fn retries_back_off_linearly_then_give_up() {
    let (client, transport) = mock_client(three_attempts());
    let statuses = record_statuses(&client);

    let first = transport.wait_for_session(0).await;
    first.open();
    wait_state(&client, ConnectionState::Connected).await;

    first.drop_connection(REASON_TRANSPORT_CLOSE);
    let mut dropped_at = Instant::now();
    let mut delays = Vec::new();

    for index in 1..=3 {
        let session = transport.wait_for_session(index).await;
        delays.push(session.opened_at() - dropped_at);
        assert_eq!(client.reconnect_attempts(), u32::try_from(index).unwrap());

        session.fail("connection refused");
        dropped_at = Instant::now();
    }
    assert_eq!(delays, [ms(1000), ms(2000), ms(3000)]);

    wait_state(&client, ConnectionState::Failed).await;
    tokio::time::sleep(ms(60_000)).await;
    client.events().flush().await;

    assert_eq!(transport.open_count(), 4);
    assert_eq!(client.reconnect_attempts(), 3);
    assert_eq!(with_reason(&statuses, REASON_MAX_RECONNECT_ATTEMPTS), 1);
    {
        let statuses = statuses.lock().unwrap();
        let last = statuses.last().unwrap();
        assert!(!last.connected);
        assert!(last.is_exhausted());
    }

    // Only a manual connect resumes, with a fresh counter on success.
    client.connect();
    let resumed = transport.wait_for_session(4).await;
    resumed.open();
    wait_state(&client, ConnectionState::Connected).await;
    assert_eq!(client.reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn drop_publishes_status_and_raw_disconnect() {
    let (client, transport) = mock_client(ConnectionConfig::default());
    let statuses = record_statuses(&client);
    let reasons = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = reasons.clone();
    client.events().on_disconnect(move |reason| {
        sink.lock().unwrap().push(reason.to_string());
    });

    let session = transport.wait_for_session(0).await;
    session.open();
    session.drop_connection(REASON_TRANSPORT_CLOSE);
    wait_state(&client, ConnectionState::Reconnecting).await;
    client.events().flush().await;

    let statuses = statuses.lock().unwrap();
    assert_eq!(statuses.len(), 2);
    assert!(statuses[0].connected);
    assert!(statuses[0].reason.is_none());
    assert!(!statuses[1].connected);
    assert_eq!(statuses[1].reason.as_deref(), Some(REASON_TRANSPORT_CLOSE));
    assert_eq!(*reasons.lock().unwrap(), [REASON_TRANSPORT_CLOSE]);
}

#[tokio::test(start_paused = true)]
async fn successful_open_resets_the_counter() {
    let (client, transport) = mock_client(three_attempts());

    let first = transport.wait_for_session(0).await;
    first.open();
    first.drop_connection(REASON_TRANSPORT_CLOSE);

    let second = transport.wait_for_session(1).await;
    second.fail("connection refused");

    let third = transport.wait_for_session(2).await;
    assert_eq!(client.reconnect_attempts(), 2);
    third.open();
    wait_state(&client, ConnectionState::Connected).await;
    assert_eq!(client.reconnect_attempts(), 0);

    third.drop_connection(REASON_TRANSPORT_CLOSE);
    let dropped_at = Instant::now();
    let fourth = transport.wait_for_session(3).await;
    assert_eq!(fourth.opened_at() - dropped_at, ms(1000));
    assert_eq!(client.reconnect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_retry() {
    let (client, transport) = mock_client(ConnectionConfig::default());

    let session = transport.wait_for_session(0).await;
    session.open();
    session.drop_connection(REASON_TRANSPORT_CLOSE);
    wait_state(&client, ConnectionState::Reconnecting).await;

    client.disconnect().await;
    tokio::time::sleep(ms(30_000)).await;

    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn manual_connect_supersedes_retry_timer() {
    let (client, transport) = mock_client(ConnectionConfig::default());

    let session = transport.wait_for_session(0).await;
    session.open();
    session.drop_connection(REASON_TRANSPORT_CLOSE);
    wait_state(&client, ConnectionState::Reconnecting).await;
    let dropped_at = Instant::now();

    client.connect();
    let manual = transport.wait_for_session(1).await;
    assert_eq!(manual.opened_at(), dropped_at);

    tokio::time::sleep(ms(30_000)).await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(client.connection_state(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn connect_while_open_is_a_no_op() {
    let (client, transport) = mock_client(ConnectionConfig::default());

    let session = transport.wait_for_session(0).await;
    client.connect();
    session.open();
    wait_state(&client, ConnectionState::Connected).await;
    client.connect();
    settle().await;

    assert_eq!(transport.open_count(), 1);
    assert!(!session.is_closed());
}

#[tokio::test(start_paused = true)]
async fn reconnection_disabled_stays_down() {
    let config = ConnectionConfig {
        reconnection: false,
        ..ConnectionConfig::default()
    };
    let (client, transport) = mock_client(config);

    let session = transport.wait_for_session(0).await;
    session.open();
    wait_state(&client, ConnectionState::Connected).await;
    session.drop_connection(REASON_TRANSPORT_CLOSE);
    wait_state(&client, ConnectionState::Disconnected).await;

    tokio::time::sleep(ms(30_000)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn events_from_a_dropped_session_are_ignored() {
    let (client, transport) = mock_client(ConnectionConfig::default());

    let session = transport.wait_for_session(0).await;
    session.open();
    session.drop_connection(REASON_TRANSPORT_CLOSE);
    wait_state(&client, ConnectionState::Reconnecting).await;

    session.metrics(sample_metrics(1));
    session.open();
    settle().await;

    assert!(client.last_metrics().is_none());
    assert_eq!(client.connection_state(), ConnectionState::Reconnecting);
}
