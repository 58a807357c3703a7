//! Retry policy and delay calculation

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Backoff multiplier for exponential strategies
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: RetryStrategy::default(),
            backoff_multiplier: default_backoff_multiplier(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately; used by tests and dry environments
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            strategy: RetryStrategy::None,
            backoff_multiplier: 1.0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_initial_delay() -> u64 {
    500
}
fn default_max_delay() -> u64 {
    10_000
}

/// Retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// No delay between attempts
    None,

    FixedDelay,

    /// Exponential backoff (default)
    #[default]
    ExponentialBackoff,

    LinearBackoff,
}

/// Delay before the next attempt
///
/// `attempt` is the 1-indexed number of the attempt that just failed.
///
/// ```rust
/// use docbro_core::retry::{calculate_delay, RetryPolicy, RetryStrategy};
///
/// let policy = RetryPolicy {
///     max_attempts: 3,
///     strategy: RetryStrategy::ExponentialBackoff,
///     backoff_multiplier: 2.0,
///     initial_delay_ms: 1000,
///     max_delay_ms: 30000,
/// };
///
/// assert_eq!(calculate_delay(&policy, 1).as_millis(), 1000);
/// assert_eq!(calculate_delay(&policy, 2).as_millis(), 2000);
/// ```
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let attempt_index = attempt.saturating_sub(1);

    let base_delay_ms = match policy.strategy {
        RetryStrategy::None => 0,
        RetryStrategy::FixedDelay => policy.initial_delay_ms,
        RetryStrategy::ExponentialBackoff => {
            let multiplier = policy.backoff_multiplier.powf(attempt_index as f64);
            (policy.initial_delay_ms as f64 * multiplier) as u64
        }
        RetryStrategy::LinearBackoff => policy
            .initial_delay_ms
            .saturating_mul(attempt_index as u64 + 1),
    };

    Duration::from_millis(base_delay_ms.min(policy.max_delay_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.strategy, RetryStrategy::ExponentialBackoff);
    }

    #[test]
    fn test_delay_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            strategy: RetryStrategy::ExponentialBackoff,
            backoff_multiplier: 2.0,
            initial_delay_ms: 1000,
            max_delay_ms: 3000,
        };
        assert_eq!(calculate_delay(&policy, 5), Duration::from_millis(3000));
    }

    #[test]
    fn test_linear_and_fixed() {
        let mut policy = RetryPolicy {
            strategy: RetryStrategy::LinearBackoff,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            ..RetryPolicy::default()
        };
        assert_eq!(calculate_delay(&policy, 3), Duration::from_millis(300));

        policy.strategy = RetryStrategy::FixedDelay;
        assert_eq!(calculate_delay(&policy, 3), Duration::from_millis(100));
    }

    #[test]
    fn test_linear_delay_saturates() {
        let policy = RetryPolicy {
            strategy: RetryStrategy::LinearBackoff,
            initial_delay_ms: u64::MAX / 2,
            max_delay_ms: 60_000,
            ..RetryPolicy::default()
        };
        assert_eq!(calculate_delay(&policy, 4), Duration::from_millis(60_000));
    }

    #[test]
    fn test_immediate_policy_has_no_delay() {
        let policy = RetryPolicy::immediate(0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(calculate_delay(&policy, 1), Duration::ZERO);
    }

    #[test]
    fn test_policy_yaml_kebab_case() {
        let policy: RetryPolicy =
            serde_yaml_ng::from_str("max-attempts: 5\nstrategy: fixed-delay\n").unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.strategy, RetryStrategy::FixedDelay);
        assert_eq!(policy.initial_delay_ms, 500);
    }
}
