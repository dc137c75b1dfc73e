//! Connection status snapshot fed by client events.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use pulse_client::MetricsClient;
use pulse_events::{ConnectionStatus, EventKind, SubscriptionId};

#[derive(Default)]
struct Snapshot {
    connected: AtomicBool,
    last_update: Mutex<Option<DateTime<Utc>>>,
    last_record: AtomicI64,
}

impl Snapshot {
    fn apply(&self, status: &ConnectionStatus) {
        self.connected.store(status.connected, Ordering::SeqCst);
        *self
            .last_update
            .lock()
            .unwrap_or_else(PoisonError::into_inner) =
            DateTime::from_timestamp_millis(status.timestamp);
    }
}

/// Tracks whether the stream is up and when that last changed.
pub(crate) struct StatusTracker {
    snapshot: Arc<Snapshot>,
    subscriptions: [(EventKind, SubscriptionId); 2],
}

impl StatusTracker {
    /// Start tracking `client`, seeded with its current connection state.
    pub(crate) fn attach(client: &MetricsClient) -> Self {
        let snapshot = Arc::new(Snapshot::default());
        snapshot
            .connected
            .store(client.is_connected(), Ordering::SeqCst);
        if let Some(record) = client.last_metrics() {
            snapshot
                .last_record
                .store(record.timestamp(), Ordering::SeqCst);
        }

        let on_status = Arc::clone(&snapshot);
        let status_id = client
            .events()
            .on_connection_change(move |status| on_status.apply(status));
        let on_data = Arc::clone(&snapshot);
        let data_id = client.events().on_data(move |record| {
            on_data
                .last_record
                .store(record.timestamp(), Ordering::SeqCst);
        });

        Self {
            snapshot,
            subscriptions: [
                (EventKind::ConnectionChange, status_id),
                (EventKind::Data, data_id),
            ],
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.snapshot.connected.load(Ordering::SeqCst)
    }

    /// When the last connection transition happened.
    pub(crate) fn last_update(&self) -> Option<DateTime<Utc>> {
        *self
            .snapshot
            .last_update
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Source timestamp of the newest record seen.
    pub(crate) fn last_record(&self) -> Option<DateTime<Utc>> {
        match self.snapshot.last_record.load(Ordering::SeqCst) {
            0 => None,
            ts => DateTime::from_timestamp_millis(ts),
        }
    }

    /// Stop tracking. The snapshot keeps its last values.
    pub(crate) fn detach(&self, client: &MetricsClient) {
        for (kind, id) in self.subscriptions {
            client.unsubscribe(kind, Some(id));
        }
    }
}
