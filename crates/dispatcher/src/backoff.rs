//! Retry backoff policy.

use std::time::Duration;

/// Capped exponential backoff: the wait doubles with every failure an event
/// has accumulated, up to `max`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Returns the wait before the next attempt, given how many times the
    /// event has already failed. The first retry waits `base`.
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        self.base.checked_mul(factor).unwrap_or(self.max).min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_failure() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(300));
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(5), Duration::from_secs(32));
    }

    #[test]
    fn delay_caps_at_max() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(300));
        assert_eq!(policy.delay(9), Duration::from_secs(300));
        assert_eq!(policy.delay(30), Duration::from_secs(300));
    }

    #[test]
    fn huge_failure_counts_do_not_overflow() {
        let policy = BackoffPolicy::new(Duration::from_secs(2), Duration::from_secs(60));
        assert_eq!(policy.delay(31), Duration::from_secs(60));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn zero_base_stays_zero() {
        let policy = BackoffPolicy::new(Duration::ZERO, Duration::from_secs(60));
        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.delay(10), Duration::ZERO);
    }
}
