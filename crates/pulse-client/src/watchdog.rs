//! Stale-data detection.
//!
//! The watchdog catches a transport that reports itself connected but has
//! stopped delivering. It judges the age of the last record against the
//! configured window; the manager runs the check on a recurring timer and
//! performs the forced reconnect.

use std::fmt;
use std::time::Duration;

use pulse_events::MetricsRecord;

/// Default staleness window.
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of "now" for staleness checks, in ms since the Unix epoch.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in ms since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        pulse_events::now_millis()
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Not connected, or nothing received yet.
    Idle,
    /// The last record is within the window.
    Fresh,
    /// Stale, and this episode already triggered a reconnect.
    AlreadyFired,
    /// Stale for the first time since the last record arrived.
    Stale { age_ms: i64 },
}

#[derive(Debug, Default)]
pub(crate) struct Watchdog {
    timeout: Option<Duration>,
    fired_for: Option<i64>,
}

impl Watchdog {
    pub(crate) fn start(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
        self.fired_for = None;
    }

    pub(crate) fn stop(&mut self) {
        self.timeout = None;
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// A new record ends the current stale episode.
    pub(crate) fn data_arrived(&mut self) {
        self.fired_for = None;
    }

    pub(crate) fn check(
        &mut self,
        connected: bool,
        snapshot: Option<&MetricsRecord>,
        now: i64,
    ) -> Verdict {
        let (Some(timeout), true, Some(record)) = (self.timeout, connected, snapshot) else {
            return Verdict::Idle;
        };
        let age_ms = record.age_millis(now);
        let window = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        if age_ms <= window {
            return Verdict::Fresh;
        }
        if self.fired_for == Some(record.timestamp()) {
            return Verdict::AlreadyFired;
        }
        self.fired_for = Some(record.timestamp());
        Verdict::Stale { age_ms }
    }
}
