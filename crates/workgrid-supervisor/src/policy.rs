//! Exit policies and restart backoff.

use std::time::Duration;

use tracing::debug;

/// What the supervisor does when the runtime exits on its own with a
/// failure status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Clean up and publish the exit code as fatal. Used by dev tooling.
    FailFast,
    /// Clean up and start the same config again after a delay.
    SelfHealing,
}

impl ExitPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitPolicy::FailFast => "fail-fast",
            ExitPolicy::SelfHealing => "self-healing",
        }
    }
}

/// Consecutive-crash backoff for self-healing restarts.
///
/// The first restart waits `base`; each further crash doubles the delay
/// up to `max`. A manual start or a long enough uptime resets it.
#[derive(Debug, Clone)]
pub struct RestartBackoff {
    base: Duration,
    max: Duration,
    current: Duration,
    consecutive_failures: u32,
}

impl RestartBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
            consecutive_failures: 0,
        }
    }

    /// Delay before the next restart attempt. Advances the backoff.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.consecutive_failures += 1;
        self.current = (self.current * 2).min(self.max);
        debug!(
            failures = self.consecutive_failures,
            delay_ms = delay.as_millis() as u64,
            "restart backoff advanced"
        );
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Delay the next call to [`next_delay`](Self::next_delay) will return.
    pub fn peek(&self) -> Duration {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_max() {
        let mut backoff = RestartBackoff::new(Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.consecutive_failures(), 5);
    }

    #[test]
    fn reset_returns_to_base() {
        let mut backoff = RestartBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.peek(), Duration::from_millis(100));
        assert_eq!(backoff.consecutive_failures(), 0);
    }

    #[test]
    fn max_below_base_is_clamped() {
        let mut backoff = RestartBackoff::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }
}
