//! Backoff policy for provider calls

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with optional jitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per chunk, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Upper bound for computed delays
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    pub backoff_multiplier: f64,

    /// Add jitter to delays
    pub jitter: bool,

    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy without delays, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
            jitter_factor: 0.0,
        }
    }

    /// Delay after the given failed attempt (1-based), before jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let multiplier = self.backoff_multiplier.powi(exponent);
        let secs = self.initial_delay.as_secs_f64() * multiplier;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Apply jitter to delay
    pub fn apply_jitter(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let mut rng = rand::rng();
        let jitter_range = delay.as_secs_f64() * self.jitter_factor;
        let jitter = rng.random_range(-jitter_range / 2.0..=jitter_range / 2.0);
        Duration::from_secs_f64((delay.as_secs_f64() + jitter).max(0.0))
    }

    /// Delay before the next attempt. A delay the provider asked for wins
    /// when it is longer.
    pub fn next_delay(&self, attempt: u32, requested: Option<Duration>) -> Duration {
        let computed = self.apply_jitter(self.delay_for_attempt(attempt));
        match requested {
            Some(requested) => computed.max(requested),
            None => computed,
        }
    }

    pub(crate) fn validate(&self, errors: &mut Vec<String>) {
        if self.max_attempts == 0 {
            errors.push("disbursement.retry.max_attempts must be at least 1".into());
        }
        if !(self.backoff_multiplier >= 1.0) {
            errors.push("disbursement.retry.backoff_multiplier must be >= 1.0".into());
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            errors.push("disbursement.retry.jitter_factor must be between 0.0 and 1.0".into());
        }
        if self.initial_delay > self.max_delay {
            errors.push("disbursement.retry.initial_delay exceeds max_delay".into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            jitter: false,
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(200), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_factor() {
        let policy = RetryPolicy {
            jitter: true,
            jitter_factor: 0.5,
            ..Default::default()
        };
        let base = Duration::from_secs(1);
        for _ in 0..100 {
            let jittered = policy.apply_jitter(base);
            assert!(jittered >= Duration::from_millis(750));
            assert!(jittered <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_provider_retry_after_wins_when_longer() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(
            policy.next_delay(1, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        assert_eq!(policy.next_delay(1, None), Duration::ZERO);
    }

    #[test]
    fn test_humantime_durations() {
        let policy: RetryPolicy =
            serde_yaml::from_str("max_attempts: 6\ninitial_delay: 250ms\nmax_delay: 1m\n").unwrap();
        assert_eq!(policy.max_attempts, 6);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
        assert!(policy.jitter);
    }
}
