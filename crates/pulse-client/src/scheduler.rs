//! Cancellable one-shot timers that report back to the owning actor.
//!
//! A [`TimerSlot`] holds at most one pending timer. Scheduling replaces the
//! pending one; cancelling aborts it. Expiry is delivered as a
//! [`TimerFired`] message, and the owner passes it through
//! [`TimerSlot::accept`] so that a message from a replaced or cancelled timer
//! that was already in flight is recognised and dropped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Which slot a timer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Reconnect,
    Watchdog,
}

/// Identity of one scheduled timer within its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerId(u64);

/// Expiry notice posted to the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerFired {
    pub(crate) kind: TimerKind,
    pub(crate) id: TimerId,
}

struct Pending {
    id: TimerId,
    task: JoinHandle<()>,
}

pub(crate) struct TimerSlot {
    kind: TimerKind,
    tx: mpsc::UnboundedSender<TimerFired>,
    pending: Option<Pending>,
    next_id: u64,
}

impl TimerSlot {
    pub(crate) fn new(kind: TimerKind, tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            kind,
            tx,
            pending: None,
            next_id: 0,
        }
    }

    /// Replace any pending timer with one firing after `delay`.
    pub(crate) fn schedule(&mut self, delay: Duration) -> TimerId {
        self.cancel();
        self.next_id = self.next_id.wrapping_add(1);
        let id = TimerId(self.next_id);
        let fired = TimerFired {
            kind: self.kind,
            id,
        };
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(fired);
        });
        trace!(kind = ?self.kind, delay_ms = delay.as_millis(), "Timer scheduled");
        self.pending = Some(Pending { id, task });
        id
    }

    /// Abort the pending timer. Returns whether one was pending.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.task.abort();
                trace!(kind = ?self.kind, "Timer cancelled");
                true
            },
            None => false,
        }
    }

    /// Whether a timer is pending.
    pub(crate) fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }

    /// Claim an expiry notice.
    ///
    /// Returns `true` only if `fired` belongs to the currently pending timer,
    /// which is then considered consumed.
    pub(crate) fn accept(&mut self, fired: TimerFired) -> bool {
        if fired.kind != self.kind {
            return false;
        }
        match &self.pending {
            Some(pending) if pending.id == fired.id => {
                self.pending = None;
                true
            },
            _ => {
                trace!(kind = ?self.kind, "Ignoring stale timer");
                false
            },
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
