//! Retry delays for reconnecting to the source and the search engine.

use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// Delay before retry number `attempt` (0-based).
pub trait BackoffPolicy: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with a cap and full jitter.
///
/// The ceiling for attempt `n` is `min(max, initial * multiplier^n)`; with
/// jitter the delay is drawn uniformly from `[0, ceiling]`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            max,
            multiplier,
            jitter: true,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial, config.max, config.multiplier)
    }

    /// Always wait the full ceiling.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs)
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let millis = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(0..=millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ExponentialBackoff {
        ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(2), 2.0)
    }

    #[test]
    fn test_ceiling_grows_and_caps() {
        let p = policy();
        assert_eq!(p.ceiling(0), Duration::from_millis(100));
        assert_eq!(p.ceiling(1), Duration::from_millis(200));
        assert_eq!(p.ceiling(3), Duration::from_millis(800));
        assert_eq!(p.ceiling(5), Duration::from_secs(2));
        assert_eq!(p.ceiling(u32::MAX), Duration::from_secs(2));
    }

    #[test]
    fn test_full_jitter_stays_under_ceiling() {
        let p = policy();
        for attempt in 0..8 {
            for _ in 0..50 {
                assert!(p.delay(attempt) <= p.ceiling(attempt));
            }
        }
    }

    #[test]
    fn test_without_jitter_is_deterministic() {
        let p = policy().without_jitter();
        assert_eq!(p.delay(2), Duration::from_millis(400));
    }
}
