//! Retry policy for failed frontier submits.
//!
//! Delay before retry `n` (0-based) is `base * factor^n`, capped at
//! `max_delay`, then spread by +/- `jitter` and capped again.

use std::time::Duration;

use crate::models::RetryConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            factor: 1.0,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry `retry` without jitter.
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let exp = self.factor.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
        let millis = self.base_delay.as_millis() as f64 * exp;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0).round() as u64)
    }

    /// Delay before retry `retry`, jittered with a fresh random sample.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.delay_with_sample(retry, fastrand::f64())
    }

    /// Delay with an explicit sample in [0, 1); 0.5 means no jitter.
    pub fn delay_with_sample(&self, retry: u32, sample: f64) -> Duration {
        let base = self.base_delay_for(retry).as_millis() as f64;
        let spread = self.jitter.clamp(0.0, 1.0) * (2.0 * sample.clamp(0.0, 1.0) - 1.0);
        let jittered = (base * (1.0 + spread)).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(jittered.max(0.0).round() as u64)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            factor: config.factor,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            factor: 2.0,
            max_delay: Duration::from_millis(1_000),
            jitter: 0.2,
        }
    }

    #[test]
    fn test_exponential_growth_with_cap() {
        let p = policy();
        assert_eq!(p.base_delay_for(0), Duration::from_millis(100));
        assert_eq!(p.base_delay_for(1), Duration::from_millis(200));
        assert_eq!(p.base_delay_for(3), Duration::from_millis(800));
        assert_eq!(p.base_delay_for(4), Duration::from_millis(1_000));
        assert_eq!(p.base_delay_for(40), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_bounds() {
        let p = policy();
        assert_eq!(p.delay_with_sample(1, 0.5), Duration::from_millis(200));
        assert_eq!(p.delay_with_sample(1, 0.0), Duration::from_millis(160));
        assert_eq!(p.delay_with_sample(1, 1.0), Duration::from_millis(240));
        // Jitter never pushes past the cap
        assert_eq!(p.delay_with_sample(10, 1.0), Duration::from_millis(1_000));

        for _ in 0..100 {
            let d = p.delay_for(2);
            assert!(d >= Duration::from_millis(320) && d <= Duration::from_millis(480));
        }
    }

    #[test]
    fn test_attempt_counts() {
        assert_eq!(policy().max_attempts(), 6);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
        assert_eq!(RetryPolicy::default().max_attempts(), 4);
    }
}
