use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnect backoff applied by the source effect after a failed attempt.
///
/// The delay before the Nth consecutive retry is
/// `base_delay * multiplier^(N - 1)`, clamped to `max_delay` when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub base_delay: Duration,

    pub multiplier: f64,

    /// `None` reproduces the unbounded growth of the delay.
    #[serde(with = "crate::serde_helpers::optional_duration")]
    pub max_delay: Option<Duration>,

    /// Stop reconnecting once `error_count` exceeds this. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Some(Duration::from_secs(30)),
            max_attempts: None,
        }
    }
}

impl BackoffConfig {
    pub fn unbounded() -> Self {
        Self {
            max_delay: None,
            ..Self::default()
        }
    }

    /// Delay before reconnecting after `error_count` consecutive failures.
    pub fn delay_for(&self, error_count: u32) -> Duration {
        if error_count == 0 {
            return Duration::ZERO;
        }

        let exponent = (error_count - 1).min(i32::MAX as u32) as i32;
        let base_ms = self.base_delay.as_millis() as f64;
        let mut delay_ms = base_ms * self.multiplier.powi(exponent);

        if let Some(max_delay) = self.max_delay {
            delay_ms = delay_ms.min(max_delay.as_millis() as f64);
        }

        // f64 -> u64 saturates, so an unbounded delay tops out instead of wrapping
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Whether another reconnect is allowed after `error_count` failures.
    pub fn allows(&self, error_count: u32) -> bool {
        self.max_attempts.map_or(true, |max| error_count <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_progression() {
        let backoff = BackoffConfig::default();

        assert_eq!(backoff.delay_for(0), Duration::ZERO);
        assert_eq!(backoff.delay_for(1), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(1000));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(2000));
        assert_eq!(backoff.delay_for(7), Duration::from_millis(30000));
        assert_eq!(backoff.delay_for(40), Duration::from_secs(30));
    }

    #[test]
    fn test_max_attempts() {
        let backoff = BackoffConfig {
            max_attempts: Some(3),
            ..BackoffConfig::default()
        };

        assert!(backoff.allows(3));
        assert!(!backoff.allows(4));
        assert!(BackoffConfig::default().allows(u32::MAX));
    }

    proptest! {
        #[test]
        fn prop_unbounded_delay_doubles(n in 1u32..20) {
            let backoff = BackoffConfig::unbounded();
            let expected = 500u64 * 2u64.pow(n - 1);
            prop_assert_eq!(backoff.delay_for(n), Duration::from_millis(expected));
        }

        #[test]
        fn prop_capped_delay_never_exceeds_cap(n in 1u32..1000) {
            let backoff = BackoffConfig::default();
            prop_assert!(backoff.delay_for(n) <= Duration::from_secs(30));
        }
    }
}
