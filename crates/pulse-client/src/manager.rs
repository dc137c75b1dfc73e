//! The connection manager.
//!
//! [`MetricsClient`] is a cheap handle. All state lives in one actor task
//! that receives public calls, transport events and timer expiries as
//! messages, so every transition is applied one at a time without locks.
//! Readers observe state through `watch` channels the actor updates before
//! it publishes the matching event.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use pulse_events::{
    ClientEvent, ConnectionStatus, EventDispatcher, EventKind, MetricsRecord,
    REASON_DATA_TIMEOUT, REASON_MAX_RECONNECT_ATTEMPTS, StreamError, SubscriptionId,
};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::ClientError;
use crate::policy::{ReconnectionPolicy, RetryDecision};
use crate::scheduler::{TimerFired, TimerKind, TimerSlot};
use crate::state::ConnectionState;
use crate::transport::{
    ConnectTarget, OutboundFrame, REQUEST_HISTORY, REQUEST_METRICS, SessionEvent, SessionId,
    Transport, TransportEvent, TransportSession, TransportSink,
};
use crate::watchdog::{Clock, SystemClock, Verdict, Watchdog};
use crate::websocket::WebSocketTransport;

/// Duration/interval pair for a history request.
///
/// Both values are passed through to the server as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryWindow {
    /// How far back, e.g. `"5m"`.
    pub duration: String,
    /// Sample spacing, e.g. `"10s"`.
    pub interval: String,
}

impl HistoryWindow {
    /// Create a window.
    #[must_use]
    pub fn new(duration: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            duration: duration.into(),
            interval: interval.into(),
        }
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new("5m", "10s")
    }
}

enum Command {
    Connect,
    Send(OutboundFrame),
    StartWatchdog(Duration),
    StopWatchdog,
    Disconnect(oneshot::Sender<()>),
    Destroy(oneshot::Sender<()>),
}

/// Handle to an auto-reconnecting metrics stream.
///
/// Clones share the same connection. When the last handle is dropped the
/// client is destroyed.
#[derive(Clone)]
pub struct MetricsClient {
    commands: mpsc::UnboundedSender<Command>,
    events: EventDispatcher,
    state: watch::Receiver<ConnectionState>,
    snapshot: watch::Receiver<Option<Arc<MetricsRecord>>>,
    attempts: watch::Receiver<u32>,
    config: Arc<ConnectionConfig>,
}

impl fmt::Debug for MetricsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsClient")
            .field("address", &self.config.address())
            .field("state", &*self.state.borrow())
            .field("attempts", &*self.attempts.borrow())
            .finish_non_exhaustive()
    }
}

impl MetricsClient {
    /// Build a client over the `WebSocket` transport.
    ///
    /// # Errors
    ///
    /// See [`MetricsClient::with_clock`].
    pub fn websocket(config: ConnectionConfig) -> Result<Self, ClientError> {
        Self::new(config, Arc::new(WebSocketTransport::new()))
    }

    /// Build a client over `transport`.
    ///
    /// # Errors
    ///
    /// See [`MetricsClient::with_clock`].
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Result<Self, ClientError> {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    /// Build a client whose watchdog reads time from `clock`.
    ///
    /// Connects immediately when `config.auto_connect` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if the configuration is
    /// unusable, or [`ClientError::NoRuntime`] outside a Tokio runtime.
    pub fn with_clock(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        tokio::runtime::Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let config = Arc::new(config);
        let events = EventDispatcher::new();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let (snapshot_tx, snapshot) = watch::channel(None);
        let (attempts_tx, attempts) = watch::channel(0);
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let actor = ClientActor {
            policy: ReconnectionPolicy::new(
                config.reconnection_delay,
                config.reconnection_delay_max,
                config.reconnection_attempts,
            ),
            config: Arc::clone(&config),
            transport,
            clock,
            events: events.clone(),
            commands: command_rx,
            transport_tx,
            transport_rx,
            timer_rx,
            retry_timer: TimerSlot::new(TimerKind::Reconnect, timer_tx.clone()),
            watchdog_timer: TimerSlot::new(TimerKind::Watchdog, timer_tx),
            watchdog: Watchdog::default(),
            session: None,
            next_session: 0,
            state: ConnectionState::Disconnected,
            snapshot: None,
            state_tx,
            snapshot_tx,
            attempts_tx,
        };
        tokio::spawn(actor.run());

        let client = Self {
            commands,
            events,
            state,
            snapshot,
            attempts,
            config,
        };
        if client.config.auto_connect {
            client.connect();
        }
        Ok(client)
    }

    /// Open the stream. No-op while a session is opening or open.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Tear the connection down and drop every listener.
    ///
    /// Cancels the pending retry and the watchdog. Returns once applied.
    /// Idempotent.
    pub async fn disconnect(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Disconnect(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Disconnect, discard the last record and shut the client down.
    ///
    /// Every call made afterwards, on any handle, is a silent no-op.
    pub async fn destroy(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Destroy(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Whether [`destroy`](Self::destroy) has completed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Fire-and-forget send. Dropped with a warning unless connected.
    pub fn send(&self, event: impl Into<String>, payload: Value) {
        self.command(Command::Send(OutboundFrame::new(event, payload)));
    }

    /// Ask the server for a history window; the answer arrives as a
    /// [`ClientEvent::History`].
    pub fn request_history(&self, window: &HistoryWindow) {
        self.send(
            REQUEST_HISTORY,
            json!({ "duration": window.duration, "interval": window.interval }),
        );
    }

    /// Ask the server to push the current metrics now.
    pub fn request_current_metrics(&self) {
        self.send(REQUEST_METRICS, Value::Null);
    }

    /// Start (or restart) stale-data detection with window `timeout`.
    ///
    /// A zero window is ignored and any running watchdog keeps its schedule.
    pub fn start_connection_watchdog(&self, timeout: Duration) {
        if timeout.is_zero() {
            warn!("Ignoring connection watchdog with a zero timeout");
            return;
        }
        self.command(Command::StartWatchdog(timeout));
    }

    /// Stop stale-data detection.
    pub fn stop_connection_watchdog(&self) {
        self.command(Command::StopWatchdog);
    }

    /// The dispatcher carrying this client's events.
    #[must_use]
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Shorthand for `events().subscribe(..)`.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, callback)
    }

    /// Shorthand for `events().unsubscribe(..)`.
    pub fn unsubscribe(&self, kind: EventKind, id: Option<SubscriptionId>) {
        self.events.unsubscribe(kind, id);
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether a session is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// The most recent record, if any.
    #[must_use]
    pub fn last_metrics(&self) -> Option<Arc<MetricsRecord>> {
        self.snapshot.borrow().clone()
    }

    /// Consecutive failed attempts since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        *self.attempts.borrow()
    }

    /// A receiver that wakes on every state change.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            trace!("Client destroyed, ignoring call");
        }
    }
}

struct ActiveSession {
    id: SessionId,
    handle: Box<dyn TransportSession>,
}

struct ClientActor {
    config: Arc<ConnectionConfig>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    events: EventDispatcher,
    commands: mpsc::UnboundedReceiver<Command>,
    transport_tx: mpsc::UnboundedSender<SessionEvent>,
    transport_rx: mpsc::UnboundedReceiver<SessionEvent>,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,
    retry_timer: TimerSlot,
    watchdog_timer: TimerSlot,
    policy: ReconnectionPolicy,
    watchdog: Watchdog,
    session: Option<ActiveSession>,
    next_session: u64,
    state: ConnectionState,
    snapshot: Option<Arc<MetricsRecord>>,
    state_tx: watch::Sender<ConnectionState>,
    snapshot_tx: watch::Sender<Option<Arc<MetricsRecord>>>,
    attempts_tx: watch::Sender<u32>,
}

impl ClientActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("All client handles dropped");
                        self.destroy();
                        break;
                    };
                    if self.handle_command(command).is_break() {
                        break;
                    }
                }
                Some(event) = self.transport_rx.recv() => self.handle_transport(event),
                Some(fired) = self.timer_rx.recv() => self.handle_timer(fired),
            }
        }
        debug!("Metrics client stopped");
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Connect => self.connect(),
            Command::Send(frame) => self.send(frame),
            Command::StartWatchdog(timeout) => {
                info!(timeout_ms = timeout.as_millis(), "Connection watchdog started");
                self.watchdog.start(timeout);
                self.watchdog_timer.schedule(timeout);
            },
            Command::StopWatchdog => {
                self.watchdog.stop();
                if self.watchdog_timer.cancel() {
                    info!("Connection watchdog stopped");
                }
            },
            Command::Disconnect(reply) => {
                self.disconnect();
                let _ = reply.send(());
            },
            Command::Destroy(reply) => {
                self.destroy();
                let _ = reply.send(());
                return ControlFlow::Break(());
            },
        }
        ControlFlow::Continue(())
    }

    fn connect(&mut self) {
        if let Some(active) = &self.session {
            debug!(session = %active.id, "Session already open, skipping connect");
            return;
        }
        self.retry_timer.cancel();

        self.next_session = self.next_session.wrapping_add(1);
        let id = SessionId::new(self.next_session);
        let sink = TransportSink::new(id, self.transport_tx.clone());
        info!(session = %id, address = %self.config.address(), "Opening metrics stream");

        let handle = self
            .transport
            .open(ConnectTarget::from(self.config.as_ref()), sink);
        self.session = Some(ActiveSession { id, handle });
        self.set_state(ConnectionState::Connecting);
    }

    fn send(&self, frame: OutboundFrame) {
        let Some(active) = self
            .session
            .as_ref()
            .filter(|_| self.state == ConnectionState::Connected)
        else {
            warn!(event = %frame.event, state = %self.state, "Cannot send, stream not connected");
            return;
        };
        trace!(session = %active.id, event = %frame.event, "Sending frame");
        if let Err(e) = active.handle.send(frame) {
            warn!(session = %active.id, error = %e, "Failed to send frame");
        }
    }

    fn disconnect(&mut self) {
        self.retry_timer.cancel();
        self.watchdog_timer.cancel();
        self.watchdog.stop();
        self.close_session();
        self.events.clear();
        if self.state != ConnectionState::Disconnected {
            info!("Metrics stream disconnected by client");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn destroy(&mut self) {
        self.commands.close();
        self.disconnect();
        self.snapshot = None;
        self.snapshot_tx.send_replace(None);
        self.events.close();
        info!("Metrics client destroyed");
    }

    fn close_session(&mut self) {
        if let Some(mut active) = self.session.take() {
            active.handle.close();
            debug!(session = %active.id, "Session closed");
        }
    }

    fn handle_transport(&mut self, SessionEvent { session, event }: SessionEvent) {
        match &self.session {
            Some(active) if active.id == session => {},
            _ => {
                trace!(session = %session, "Ignoring event from inactive session");
                return;
            },
        }

        match event {
            TransportEvent::Connected => self.on_open(session),
            TransportEvent::Disconnected { reason } => self.on_closed(session, reason),
            TransportEvent::ConnectError { message } => {
                warn!(session = %session, error = %message, "Stream connect error");
                self.events
                    .publish(ClientEvent::Error(StreamError::new(message)));
            },
            TransportEvent::Metrics(record) => self.on_metrics(record),
            TransportEvent::MetricsHistory(records) => {
                info!(session = %session, count = records.len(), "Received metrics history");
                self.events.publish(ClientEvent::History(Arc::new(records)));
            },
            TransportEvent::ReconnectAttempt(attempt) => {
                info!(
                    attempt,
                    max = self.policy.max_attempts(),
                    "Transport reconnect attempt"
                );
                self.policy.set_attempt(attempt);
                self.publish_attempts();
            },
            TransportEvent::Reconnected(attempt) => {
                info!(attempt, "Transport reconnected");
                self.policy.reset();
                self.publish_attempts();
            },
            TransportEvent::ReconnectFailed => {
                error!("Transport reconnect failed, attempts exhausted");
                self.policy.set_attempt(self.policy.max_attempts());
                self.publish_attempts();
            },
        }
    }

    fn on_open(&mut self, session: SessionId) {
        info!(session = %session, "Metrics stream connected");
        self.policy.reset();
        self.publish_attempts();
        self.set_state(ConnectionState::Connected);

        self.events
            .publish(ClientEvent::ConnectionChange(ConnectionStatus::up()));
        self.events.publish(ClientEvent::Connect);

        if self.config.replay_last_on_connect
            && let Some(record) = &self.snapshot
        {
            debug!(timestamp = record.timestamp(), "Replaying last record");
            self.events.publish(ClientEvent::Data(Arc::clone(record)));
        }
    }

    fn on_metrics(&mut self, record: MetricsRecord) {
        trace!(timestamp = record.timestamp(), "Metrics received");
        let record = Arc::new(record);
        self.snapshot = Some(Arc::clone(&record));
        self.snapshot_tx.send_replace(Some(Arc::clone(&record)));
        self.watchdog.data_arrived();
        self.events.publish(ClientEvent::Data(record));
    }

    fn on_closed(&mut self, session: SessionId, reason: String) {
        warn!(session = %session, reason = %reason, "Metrics stream disconnected");
        self.session = None;
        self.set_state(ConnectionState::Disconnected);

        self.events.publish(ClientEvent::ConnectionChange(ConnectionStatus::down(
            reason.clone(),
        )));
        self.events.publish(ClientEvent::Disconnect { reason });

        if !self.config.reconnection {
            return;
        }

        match self.policy.on_drop() {
            RetryDecision::Retry { attempt, delay } => {
                info!(
                    attempt,
                    max = self.policy.max_attempts(),
                    delay_ms = delay.as_millis(),
                    "Scheduling reconnect"
                );
                self.publish_attempts();
                self.retry_timer.schedule(delay);
                self.set_state(ConnectionState::Reconnecting);
            },
            RetryDecision::Exhausted => {
                error!(
                    max = self.policy.max_attempts(),
                    "Max reconnect attempts reached, giving up"
                );
                self.set_state(ConnectionState::Failed);
                self.events.publish(ClientEvent::ConnectionChange(ConnectionStatus::down(
                    REASON_MAX_RECONNECT_ATTEMPTS,
                )));
            },
        }
    }

    fn handle_timer(&mut self, fired: TimerFired) {
        match fired.kind {
            TimerKind::Reconnect => {
                if !self.retry_timer.accept(fired) {
                    return;
                }
                if self.session.is_some() {
                    debug!("Retry timer fired with a session already open");
                    return;
                }
                info!(attempt = self.policy.attempt(), "Reconnecting");
                self.connect();
            },
            TimerKind::Watchdog => {
                if self.watchdog_timer.accept(fired) {
                    self.check_watchdog();
                }
            },
        }
    }

    fn check_watchdog(&mut self) {
        let Some(timeout) = self.watchdog.timeout() else {
            return;
        };
        let connected = self.state == ConnectionState::Connected;
        let now = self.clock.now_millis();

        match self
            .watchdog
            .check(connected, self.snapshot.as_deref(), now)
        {
            Verdict::Stale { age_ms } => {
                warn!(
                    age_ms,
                    timeout_ms = timeout.as_millis(),
                    "No fresh data, forcing reconnect"
                );
                self.events
                    .publish(ClientEvent::ConnectionChange(ConnectionStatus::down(
                        REASON_DATA_TIMEOUT,
                    )));
                self.close_session();
                self.connect();
            },
            Verdict::AlreadyFired => {
                debug!("Data still stale after forced reconnect");
            },
            Verdict::Idle | Verdict::Fresh => {},
        }
        self.watchdog_timer.schedule(timeout);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Connection state changed");
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn publish_attempts(&self) {
        self.attempts_tx.send_replace(self.policy.attempt());
    }
}
