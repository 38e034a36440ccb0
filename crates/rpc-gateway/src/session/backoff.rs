//! Reconnect backoff

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with a ceiling and jitter
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self {
            base,
            ceiling: ceiling.max(base),
            attempt: 0,
        }
    }

    /// Delay before the next attempt; grows until the ceiling
    ///
    /// The result lies in `[step / 2, step]` where `step` doubles per call.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt.min(16)).unwrap_or(u32::MAX);
        let step = self.base.saturating_mul(factor).min(self.ceiling);
        self.attempt = self.attempt.saturating_add(1);

        let half = step / 2;
        let jitter = rand::thread_rng().gen_range(0.0..=1.0);
        half + half.mul_f64(jitter)
    }

    /// Back to the base delay after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delays handed out since the last reset
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_and_stay_under_ceiling() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(8));
        let expected_steps = [1, 2, 4, 8, 8, 8];

        for step in expected_steps {
            let delay = backoff.next_delay();
            let step = Duration::from_secs(step);
            assert!(delay >= step / 2, "{delay:?} < {:?}", step / 2);
            assert!(delay <= step, "{delay:?} > {step:?}");
        }
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::default();
        for _ in 0..5 {
            backoff.next_delay();
        }
        assert_eq!(backoff.attempt(), 5);
        backoff.reset();
        assert!(backoff.next_delay() <= Duration::from_secs(1));
    }

    #[test]
    fn test_many_attempts_do_not_overflow() {
        let mut backoff = Backoff::default();
        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_secs(60));
        }
    }
}
