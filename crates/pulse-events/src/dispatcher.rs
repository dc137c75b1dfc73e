//! Deferred, fault-isolated event delivery.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::event::{ClientEvent, EventKind};
use crate::record::{ConnectionStatus, MetricsRecord, StreamError};

/// Capacity of the broadcast channel behind [`EventReceiver`]s.
pub const BROADCAST_CAPACITY: usize = 1024;

/// Undelivered publishes at which the dispatcher starts warning.
///
/// Repeats at every further multiple.
pub const BACKLOG_WARN_THRESHOLD: usize = 4096;

/// A listener callback.
pub type Callback = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

/// Handle returned by `subscribe`, used for targeted removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

enum Command {
    Subscribe {
        kind: EventKind,
        id: SubscriptionId,
        callback: Callback,
    },
    Unsubscribe {
        kind: EventKind,
        id: Option<SubscriptionId>,
    },
    Publish(Arc<ClientEvent>),
    Receiver {
        kinds: Vec<EventKind>,
        reply: oneshot::Sender<EventReceiver>,
    },
    Count {
        kind: EventKind,
        reply: oneshot::Sender<usize>,
    },
    Flush(oneshot::Sender<()>),
    Clear,
    Close,
}

/// Typed publish/subscribe registry with deferred delivery.
///
/// Every operation is a message to a delivery task that owns the listener
/// registry, so `publish` never runs a callback on the caller's stack and
/// never sees a callback's panic. Cloning yields another handle to the same
/// registry.
#[derive(Clone)]
pub struct EventDispatcher {
    commands: mpsc::UnboundedSender<Command>,
    closed: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("closed", &self.is_closed())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    /// Create a dispatcher and spawn its delivery task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(AtomicUsize::new(0));
        tokio::spawn(DeliveryTask::new(rx, Arc::clone(&closed), Arc::clone(&pending)).run());
        Self {
            commands,
            closed,
            pending,
        }
    }

    /// Register `callback` for `kind`.
    ///
    /// Listeners for one kind are invoked in the order they subscribed.
    /// After [`close`](Self::close) the callback is dropped and never called.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.send(Command::Subscribe {
            kind,
            id,
            callback: Arc::new(callback),
        });
        id
    }

    /// Remove one listener, or every listener of `kind` when `id` is `None`.
    ///
    /// Takes effect for subsequent publishes; deliveries already queued may
    /// still land.
    pub fn unsubscribe(&self, kind: EventKind, id: Option<SubscriptionId>) {
        self.send(Command::Unsubscribe { kind, id });
    }

    /// Listen for connection transitions.
    pub fn on_connection_change<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::ConnectionChange, move |event| {
            if let ClientEvent::ConnectionChange(status) = event {
                f(status);
            }
        })
    }

    /// Listen for metrics records.
    pub fn on_data<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&MetricsRecord) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Data, move |event| {
            if let ClientEvent::Data(record) = event {
                f(record);
            }
        })
    }

    /// Listen for history batches.
    pub fn on_history<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&[MetricsRecord]) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::History, move |event| {
            if let ClientEvent::History(records) = event {
                f(records);
            }
        })
    }

    /// Listen for transport errors.
    pub fn on_error<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Error, move |event| {
            if let ClientEvent::Error(err) = event {
                f(err);
            }
        })
    }

    /// Listen for raw transport opens.
    pub fn on_connect<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Connect, move |event| {
            if matches!(event, ClientEvent::Connect) {
                f();
            }
        })
    }

    /// Listen for raw transport closes.
    pub fn on_disconnect<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Disconnect, move |event| {
            if let ClientEvent::Disconnect { reason } = event {
                f(reason);
            }
        })
    }

    /// Queue `event` for delivery and return immediately.
    ///
    /// The callback queue is unbounded: a listener slower than the publish
    /// rate grows it without limit. Only [`EventReceiver`]s are capped, at
    /// [`BROADCAST_CAPACITY`]. Each time the backlog reaches a multiple of
    /// [`BACKLOG_WARN_THRESHOLD`] a warning is logged; see
    /// [`pending`](Self::pending).
    pub fn publish(&self, event: ClientEvent) {
        if self.is_closed() {
            trace!("Dispatcher closed, dropping event");
            return;
        }
        let kind = event.kind();
        trace!(%kind, "Publishing event");
        let backlog = self.pending.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        if backlog.is_multiple_of(BACKLOG_WARN_THRESHOLD) {
            warn!(backlog, %kind, "Event delivery is falling behind publishers");
        }
        if self.commands.send(Command::Publish(Arc::new(event))).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Published events not yet handed to listeners.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Open an async receiver for the given kinds.
    ///
    /// The receiver sees events published after this call returns. It ends
    /// once the dispatcher is closed.
    pub async fn receiver(&self, kinds: impl IntoIterator<Item = EventKind>) -> EventReceiver {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Receiver {
            kinds: kinds.into_iter().collect(),
            reply,
        });
        match rx.await {
            Ok(receiver) => receiver,
            Err(_) => EventReceiver::ended(),
        }
    }

    /// Number of listeners registered for `kind`.
    pub async fn listener_count(&self, kind: EventKind) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Count { kind, reply });
        rx.await.unwrap_or_default()
    }

    /// Wait until everything queued before this call has been delivered.
    pub async fn flush(&self) {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Flush(reply));
        let _ = rx.await;
    }

    /// Drop every listener of every kind.
    pub fn clear(&self) {
        self.send(Command::Clear);
    }

    /// Stop the delivery task. Later calls on any handle are no-ops.
    ///
    /// Events queued before `close` are still delivered.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.commands.send(Command::Close);
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn send(&self, command: Command) {
        if self.is_closed() {
            trace!("Dispatcher closed, dropping command");
            return;
        }
        // The task only exits after Close, so a send error means we raced it.
        let _ = self.commands.send(command);
    }
}

struct Listener {
    id: SubscriptionId,
    callback: Callback,
}

struct DeliveryTask {
    commands: mpsc::UnboundedReceiver<Command>,
    closed: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
    listeners: HashMap<EventKind, Vec<Listener>>,
    broadcast: broadcast::Sender<Arc<ClientEvent>>,
}

impl DeliveryTask {
    fn new(
        commands: mpsc::UnboundedReceiver<Command>,
        closed: Arc<AtomicBool>,
        pending: Arc<AtomicUsize>,
    ) -> Self {
        let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            commands,
            closed,
            pending,
            listeners: HashMap::new(),
            broadcast,
        }
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Subscribe { kind, id, callback } => {
                    self.listeners
                        .entry(kind)
                        .or_default()
                        .push(Listener { id, callback });
                    debug!(%kind, subscription = %id, "Listener registered");
                },
                Command::Unsubscribe { kind, id: Some(id) } => {
                    if let Some(list) = self.listeners.get_mut(&kind) {
                        list.retain(|l| l.id != id);
                    }
                    debug!(%kind, subscription = %id, "Listener removed");
                },
                Command::Unsubscribe { kind, id: None } => {
                    self.listeners.remove(&kind);
                    debug!(%kind, "All listeners removed for kind");
                },
                Command::Publish(event) => {
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                    self.deliver(&event);
                },
                Command::Receiver { kinds, reply } => {
                    let _ = reply.send(EventReceiver::new(self.broadcast.subscribe(), kinds));
                },
                Command::Count { kind, reply } => {
                    let _ = reply.send(self.listeners.get(&kind).map_or(0, Vec::len));
                },
                Command::Flush(reply) => {
                    let _ = reply.send(());
                },
                Command::Clear => {
                    self.listeners.clear();
                    debug!("All listeners cleared");
                },
                Command::Close => break,
            }
        }
        self.closed.store(true, Ordering::SeqCst);
        debug!("Dispatcher delivery task stopped");
    }

    fn deliver(&self, event: &Arc<ClientEvent>) {
        let kind = event.kind();
        // No receivers is fine.
        let _ = self.broadcast.send(Arc::clone(event));

        let Some(listeners) = self.listeners.get(&kind) else {
            return;
        };
        for listener in listeners {
            let result = catch_unwind(AssertUnwindSafe(|| (listener.callback)(event)));
            if let Err(panic) = result {
                warn!(
                    %kind,
                    subscription = %listener.id,
                    panic = %panic_message(panic.as_ref()),
                    "Listener panicked"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Async receiver over a subset of event kinds.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<ClientEvent>>,
    kinds: Vec<EventKind>,
}

impl fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventReceiver")
            .field("kinds", &self.kinds)
            .finish_non_exhaustive()
    }
}

impl EventReceiver {
    fn new(receiver: broadcast::Receiver<Arc<ClientEvent>>, kinds: Vec<EventKind>) -> Self {
        Self { receiver, kinds }
    }

    /// A receiver that is already at end of stream.
    fn ended() -> Self {
        let (tx, rx) = broadcast::channel(1);
        drop(tx);
        Self::new(rx, Vec::new())
    }

    fn matches(&self, event: &ClientEvent) -> bool {
        self.kinds.contains(&event.kind())
    }

    /// Receive the next matching event.
    ///
    /// Returns `None` once the dispatcher is closed. Events dropped because
    /// this receiver fell behind are logged and skipped.
    pub async fn recv(&mut self) -> Option<Arc<ClientEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                },
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive a matching event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<ClientEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                },
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn data(ts: i64) -> ClientEvent {
        ClientEvent::Data(Arc::new(MetricsRecord::new(ts, json!({}))))
    }

    #[tokio::test]
    async fn test_publish_is_deferred() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        dispatcher.on_data(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.publish(data(1));
        // Nothing has run on the publishing stack.
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        dispatcher.flush().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pending_tracks_undelivered_publishes() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on_data(|_| {});

        // The delivery task cannot run until this task yields.
        for ts in 0..=i64::try_from(BACKLOG_WARN_THRESHOLD).unwrap() {
            dispatcher.publish(data(ts));
        }
        assert_eq!(dispatcher.pending(), BACKLOG_WARN_THRESHOLD.saturating_add(1));

        dispatcher.flush().await;
        assert_eq!(dispatcher.pending(), 0);

        dispatcher.close();
        dispatcher.publish(data(1));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_subscription_order_and_fifo() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b"] {
            let log = Arc::clone(&log);
            dispatcher.on_data(move |record| {
                log.lock().unwrap().push(format!("{name}{}", record.timestamp()));
            });
        }

        dispatcher.publish(data(1));
        dispatcher.publish(data(2));
        dispatcher.flush().await;

        assert_eq!(*log.lock().unwrap(), ["a1", "b1", "a2", "b2"]);
    }

    #[tokio::test]
    async fn test_panicking_listener_is_isolated() {
        let dispatcher = EventDispatcher::new();
        let data_hits = Arc::new(AtomicUsize::new(0));
        let status_hits = Arc::new(AtomicUsize::new(0));

        dispatcher.on_data(|_| panic!("listener failure"));
        let h = Arc::clone(&data_hits);
        dispatcher.on_data(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let h = Arc::clone(&status_hits);
        dispatcher.on_connection_change(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.publish(data(1));
        dispatcher.publish(ClientEvent::ConnectionChange(ConnectionStatus::up()));
        dispatcher.publish(data(2));
        dispatcher.flush().await;

        assert_eq!(data_hits.load(Ordering::SeqCst), 2);
        assert_eq!(status_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_one() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let id = dispatcher.on_error(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.on_error(|_| {});

        dispatcher.unsubscribe(EventKind::Error, Some(id));
        dispatcher.publish(ClientEvent::Error(StreamError::new("boom")));
        dispatcher.flush().await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.listener_count(EventKind::Error).await, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_kind() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on_connect(|| {});
        dispatcher.on_connect(|| {});
        dispatcher.on_disconnect(|_| {});

        dispatcher.unsubscribe(EventKind::Connect, None);

        assert_eq!(dispatcher.listener_count(EventKind::Connect).await, 0);
        assert_eq!(dispatcher.listener_count(EventKind::Disconnect).await, 1);
    }

    #[tokio::test]
    async fn test_same_callback_twice_is_two_listeners() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let callback: Callback = Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let first = Arc::clone(&callback);
        dispatcher.subscribe(EventKind::Connect, move |e| first(e));
        let second = Arc::clone(&callback);
        dispatcher.subscribe(EventKind::Connect, move |e| second(e));

        dispatcher.publish(ClientEvent::Connect);
        dispatcher.flush().await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on_data(|_| {});
        dispatcher.on_history(|_| {});
        dispatcher.clear();

        for kind in EventKind::ALL {
            assert_eq!(dispatcher.listener_count(kind).await, 0);
        }
    }

    #[tokio::test]
    async fn test_receiver_filters_kinds() {
        let dispatcher = EventDispatcher::new();
        let mut receiver = dispatcher.receiver([EventKind::Disconnect]).await;

        dispatcher.publish(ClientEvent::Connect);
        dispatcher.publish(ClientEvent::Disconnect {
            reason: "transport close".into(),
        });

        let event = receiver.recv().await.unwrap();
        assert!(matches!(&*event, ClientEvent::Disconnect { reason } if reason == "transport close"));
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_close_makes_calls_noops() {
        let dispatcher = EventDispatcher::new();
        let mut receiver = dispatcher.receiver(EventKind::ALL).await;
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        dispatcher.on_connect(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.close();
        assert!(dispatcher.is_closed());

        dispatcher.publish(ClientEvent::Connect);
        dispatcher.flush().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.listener_count(EventKind::Connect).await, 0);
        assert!(receiver.recv().await.is_none());

        let mut late = dispatcher.receiver(EventKind::ALL).await;
        assert!(late.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_listener_can_publish() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let inner = dispatcher.clone();
        dispatcher.on_connect(move || inner.publish(ClientEvent::Error(StreamError::new("x"))));
        let h = Arc::clone(&hits);
        dispatcher.on_error(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.publish(ClientEvent::Connect);
        dispatcher.flush().await;
        // The nested publish was queued behind the first flush.
        dispatcher.flush().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
