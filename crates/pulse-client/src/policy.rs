//! Linear, capped reconnection backoff.
//!
//! Attempt `n` (1-based) waits `min(base * n, max)`. After `max_attempts`
//! consecutive drops without a successful open the policy is exhausted.

use std::time::Duration;

/// What to do after a drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule one retry after `delay`.
    Retry {
        /// 1-based attempt number.
        attempt: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// Give up until a manual connect.
    Exhausted,
}

/// Retry counter plus delay calculator.
#[derive(Debug, Clone)]
pub struct ReconnectionPolicy {
    base: Duration,
    max: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl ReconnectionPolicy {
    /// Create a policy with the counter at zero.
    #[must_use]
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay before attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt).min(self.max)
    }

    /// Record a drop and decide whether to retry.
    pub fn on_drop(&mut self) -> RetryDecision {
        if self.attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        self.attempt = self.attempt.saturating_add(1);
        RetryDecision::Retry {
            attempt: self.attempt,
            delay: self.delay_for(self.attempt),
        }
    }

    /// Reset the counter after a successful open.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Overwrite the counter with a value reported by the transport.
    pub fn set_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
    }

    /// Current consecutive-failure count.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Configured retry limit.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn delays_are_linear_then_capped() {
        let p = ReconnectionPolicy::new(ms(1000), ms(5000), 10);
        let delays: Vec<_> = (1..=7).map(|n| p.delay_for(n)).collect();
        assert_eq!(
            delays,
            [ms(1000), ms(2000), ms(3000), ms(4000), ms(5000), ms(5000), ms(5000)]
        );
    }

    #[test]
    fn three_attempts_then_exhausted() {
        let mut p = ReconnectionPolicy::new(ms(1000), ms(5000), 3);
        assert_eq!(
            p.on_drop(),
            RetryDecision::Retry {
                attempt: 1,
                delay: ms(1000)
            }
        );
        assert_eq!(
            p.on_drop(),
            RetryDecision::Retry {
                attempt: 2,
                delay: ms(2000)
            }
        );
        assert_eq!(
            p.on_drop(),
            RetryDecision::Retry {
                attempt: 3,
                delay: ms(3000)
            }
        );
        assert_eq!(p.on_drop(), RetryDecision::Exhausted);
        assert_eq!(p.on_drop(), RetryDecision::Exhausted);
        assert_eq!(p.attempt(), 3);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut p = ReconnectionPolicy::new(ms(1000), ms(5000), 3);
        let _ = p.on_drop();
        let _ = p.on_drop();
        p.reset();
        assert_eq!(p.attempt(), 0);
        assert_eq!(
            p.on_drop(),
            RetryDecision::Retry {
                attempt: 1,
                delay: ms(1000)
            }
        );
    }

    #[test]
    fn zero_attempts_is_immediately_exhausted() {
        let mut p = ReconnectionPolicy::new(ms(1000), ms(5000), 0);
        assert_eq!(p.on_drop(), RetryDecision::Exhausted);
    }

    #[test]
    fn delay_saturates() {
        let p = ReconnectionPolicy::new(Duration::MAX, Duration::MAX, 1);
        assert_eq!(p.delay_for(u32::MAX), Duration::MAX);
    }

    #[test]
    fn set_attempt_mirrors_transport() {
        let mut p = ReconnectionPolicy::new(ms(1000), ms(5000), 3);
        p.set_attempt(3);
        assert_eq!(p.on_drop(), RetryDecision::Exhausted);
    }
}
