//! Scriptable transport for driving a client from tests.
//!
//! [`MockTransport`] records every session the client opens. Tests pick a
//! session up with [`MockTransport::wait_for_session`] and then play the
//! server's part: open it, push records, drop it, fail it. Everything the
//! client sends is captured for inspection.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pulse_client::{
    ConnectTarget, OutboundFrame, REASON_CONNECT_ERROR, Transport, TransportError,
    TransportEvent, TransportSession, TransportSink,
};
use pulse_events::MetricsRecord;
use tokio::sync::Notify;
use tokio::time::Instant;

/// How long [`MockTransport::wait_for_session`] waits before failing the test.
pub const SESSION_WAIT_LIMIT: Duration = Duration::from_secs(600);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SessionShared {
    index: usize,
    target: ConnectTarget,
    sink: TransportSink,
    opened_at: Instant,
    sent: Mutex<Vec<OutboundFrame>>,
    closed: AtomicBool,
}

/// The test's side of one session.
#[derive(Clone)]
pub struct MockSession {
    shared: Arc<SessionShared>,
}

impl std::fmt::Debug for MockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSession")
            .field("index", &self.shared.index)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl MockSession {
    /// Zero-based order in which the client opened this session.
    #[must_use]
    pub fn index(&self) -> usize {
        self.shared.index
    }

    /// What the client asked to connect to.
    #[must_use]
    pub fn target(&self) -> &ConnectTarget {
        &self.shared.target
    }

    /// When (in Tokio time) the client opened this session.
    #[must_use]
    pub fn opened_at(&self) -> Instant {
        self.shared.opened_at
    }

    /// Report an arbitrary event. Returns `false` if the client is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.shared.sink.emit(event)
    }

    /// Report a successful open.
    pub fn open(&self) {
        self.emit(TransportEvent::Connected);
    }

    /// Push a live record.
    pub fn metrics(&self, record: MetricsRecord) {
        self.emit(TransportEvent::Metrics(record));
    }

    /// Push a history batch.
    pub fn history(&self, records: Vec<MetricsRecord>) {
        self.emit(TransportEvent::MetricsHistory(records));
    }

    /// Report an unexpected close.
    pub fn drop_connection(&self, reason: &str) {
        self.emit(TransportEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    /// Report a connect error without closing.
    pub fn connect_error(&self, message: &str) {
        self.emit(TransportEvent::ConnectError {
            message: message.to_string(),
        });
    }

    /// Report a failed open: a connect error followed by the close.
    pub fn fail(&self, message: &str) {
        self.connect_error(message);
        self.drop_connection(REASON_CONNECT_ERROR);
    }

    /// Frames the client sent on this session.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundFrame> {
        lock(&self.shared.sent).clone()
    }

    /// Whether the client closed this session.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

/// The client's side of one session.
struct MockSessionHandle {
    shared: Arc<SessionShared>,
}

impl TransportSession for MockSessionHandle {
    fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        lock(&self.shared.sent).push(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

/// A [`Transport`] whose sessions are driven by the test.
#[derive(Default)]
pub struct MockTransport {
    sessions: Mutex<Vec<MockSession>>,
    opened: Notify,
    auto_open: bool,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("open_count", &self.open_count())
            .field("auto_open", &self.auto_open)
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    /// A transport whose sessions stay pending until the test opens them.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A transport that reports every session open immediately.
    #[must_use]
    pub fn auto_open() -> Arc<Self> {
        Arc::new(Self {
            auto_open: true,
            ..Self::default()
        })
    }

    /// Number of sessions opened so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Session `index`, if opened.
    #[must_use]
    pub fn session(&self, index: usize) -> Option<MockSession> {
        lock(&self.sessions).get(index).cloned()
    }

    /// The most recently opened session.
    #[must_use]
    pub fn last_session(&self) -> Option<MockSession> {
        lock(&self.sessions).last().cloned()
    }

    /// Every session opened so far.
    #[must_use]
    pub fn sessions(&self) -> Vec<MockSession> {
        lock(&self.sessions).clone()
    }

    /// Wait until session `index` has been opened.
    ///
    /// Under paused Tokio time this lets pending timers (such as a retry)
    /// fire while waiting.
    ///
    /// # Panics
    ///
    /// Panics if the session is not opened within [`SESSION_WAIT_LIMIT`].
    pub async fn wait_for_session(&self, index: usize) -> MockSession {
        let wait = async {
            loop {
                let mut notified = pin!(self.opened.notified());
                notified.as_mut().enable();
                if let Some(session) = self.session(index) {
                    return session;
                }
                notified.await;
            }
        };
        tokio::time::timeout(SESSION_WAIT_LIMIT, wait)
            .await
            .unwrap_or_else(|_| panic!("session {index} was never opened"))
    }
}

impl Transport for MockTransport {
    fn open(&self, target: ConnectTarget, sink: TransportSink) -> Box<dyn TransportSession> {
        let shared = {
            let mut sessions = lock(&self.sessions);
            let shared = Arc::new(SessionShared {
                index: sessions.len(),
                target,
                sink,
                opened_at: Instant::now(),
                sent: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            });
            sessions.push(MockSession {
                shared: Arc::clone(&shared),
            });
            shared
        };
        self.opened.notify_waiters();
        if self.auto_open {
            shared.sink.emit(TransportEvent::Connected);
        }
        Box::new(MockSessionHandle { shared })
    }
}
