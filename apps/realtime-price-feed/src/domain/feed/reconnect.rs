//! Reconnection Policy
//!
//! Exponential backoff for re-establishing the feed transport after an
//! abnormal closure:
//!
//! ```text
//! delay(n) = min(initial_delay * multiplier^n, max_delay)
//! ```
//!
//! where `n` is the number of abnormal closures since the last successful
//! open. The count only resets on a successful open, never on a retry.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor per attempt (2.0 doubles the delay).
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%). Zero disables jitter.
    pub jitter_factor: f64,
    /// Maximum reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 0, // Unlimited
        }
    }
}

/// Backoff state for one feed client.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay for the next attempt, then count the attempt.
    ///
    /// Returns `None` once `max_attempts` is exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        let delay = self.apply_jitter(self.delay_for(self.attempt_count));
        self.attempt_count = self.attempt_count.saturating_add(1);
        Some(delay)
    }

    /// Un-jittered delay for a given attempt index.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let initial_millis = self.config.initial_delay.as_millis() as f64;
        #[allow(clippy::cast_possible_wrap)]
        let scaled = initial_millis * self.config.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let max_millis = self.config.max_delay.as_millis();

        let millis = if scaled.is_finite() && scaled >= 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                (scaled.round() as u128).min(max_millis)
            }
        } else {
            max_millis
        };

        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Reset after a successful open.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Abnormal closures since the last successful open.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Policy configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Spread `delay` uniformly over `delay * (1 ± jitter_factor)`, never
    /// below one millisecond.
    fn apply_jitter(&self, delay: Duration) -> Duration {
        let factor = self.config.jitter_factor;
        if !(factor > 0.0 && factor.is_finite()) {
            return delay;
        }

        let spread = delay.mul_f64(factor.min(1.0));
        let offset = rand::rng().random_range(Duration::ZERO..=spread.saturating_mul(2));
        (delay + offset)
            .saturating_sub(spread)
            .max(Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert!(config.jitter_factor.abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 0);
    }

    #[test_case(1, 1_000 ; "first closure")]
    #[test_case(2, 2_000 ; "second closure")]
    #[test_case(3, 4_000 ; "third closure")]
    #[test_case(5, 16_000 ; "fifth closure")]
    #[test_case(6, 30_000 ; "capped at max")]
    #[test_case(40, 30_000 ; "stays capped")]
    fn nth_delay_matches_formula(n: u32, expected_ms: u64) {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let mut last = Duration::ZERO;
        for _ in 0..n {
            last = policy.next_delay().unwrap();
        }
        assert_eq!(last, Duration::from_millis(expected_ms));
        assert_eq!(policy.attempt_count(), n);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn max_attempts_exhausts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            max_attempts: 2,
            ..ReconnectConfig::default()
        });

        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
    }

    #[test]
    fn huge_attempt_saturates_at_max() {
        let policy = ReconnectPolicy::new(ReconnectConfig::default());
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_factor() {
        let config = ReconnectConfig {
            jitter_factor: 0.1,
            ..ReconnectConfig::default()
        };

        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(config.clone());
            let delay = policy.next_delay().unwrap();
            assert!(
                (Duration::from_millis(900)..=Duration::from_millis(1100)).contains(&delay),
                "{delay:?} outside 1s ±10%"
            );
        }
    }
}
