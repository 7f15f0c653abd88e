//! Retry scheduling

use crate::classifier::DEFAULT_RATE_LIMIT_COOLDOWN;
use crate::outcome::{AttemptOutcome, OutcomeKind};
use std::time::Duration;

/// Retry policy for provisioning attempts
///
/// Pure function of the outcome and the number of consecutive failures; no I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after capacity / transient failures
    pub interval: Duration,

    /// Minimum cool-down after the provider rate-limits us
    pub rate_limit_cooldown: Duration,

    /// Backoff multiplier (1.0 = fixed interval)
    pub backoff_multiplier: f64,

    /// Upper bound for the backed-off interval
    pub max_delay: Duration,
}

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30 * 60);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RETRY_INTERVAL,
            rate_limit_cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
            backoff_multiplier: 1.0,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, multiplier: f64, max_delay: Duration) -> Self {
        self.backoff_multiplier = multiplier;
        self.max_delay = max_delay;
        self
    }

    /// Delay before the next automatic attempt, `None` = do not auto-retry
    ///
    /// `consecutive_failures` counts the failure being scheduled (1 for the
    /// first failure).
    pub fn next_delay(&self, kind: OutcomeKind, consecutive_failures: u32) -> Option<Duration> {
        match kind {
            OutcomeKind::CapacityExhausted | OutcomeKind::TransientProviderError => {
                Some(self.backed_off(consecutive_failures))
            }
            OutcomeKind::RateLimited => Some(self.rate_limit_cooldown),
            OutcomeKind::ConfigurationError
            | OutcomeKind::UnknownError
            | OutcomeKind::Success => None,
        }
    }

    /// Like [`RetryPolicy::next_delay`], honoring the provider's cool-down hint
    pub fn delay_after(&self, outcome: &AttemptOutcome, consecutive_failures: u32) -> Option<Duration> {
        match outcome {
            AttemptOutcome::RateLimited { retry_after, .. } => {
                Some((*retry_after).max(self.rate_limit_cooldown))
            }
            other => self.next_delay(other.kind(), consecutive_failures),
        }
    }

    fn backed_off(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let multiplier = if self.backoff_multiplier.is_finite() && self.backoff_multiplier > 1.0 {
            self.backoff_multiplier
        } else {
            1.0
        };
        let secs = self.interval.as_secs_f64() * multiplier.powi(exponent);
        let max = self.max_delay.max(self.interval);
        if !secs.is_finite() || secs >= max.as_secs_f64() {
            max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_uses_fixed_interval() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.next_delay(OutcomeKind::CapacityExhausted, 1),
            Some(Duration::from_secs(120))
        );
        assert_eq!(
            policy.next_delay(OutcomeKind::CapacityExhausted, 50),
            Some(Duration::from_secs(120))
        );
        assert_eq!(
            policy.next_delay(OutcomeKind::TransientProviderError, 3),
            Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn test_no_retry_for_configuration_and_unknown() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(OutcomeKind::ConfigurationError, 1), None);
        assert_eq!(policy.next_delay(OutcomeKind::UnknownError, 1), None);
        assert_eq!(policy.next_delay(OutcomeKind::Success, 0), None);
    }

    #[test]
    fn test_rate_limit_cooldown() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.next_delay(OutcomeKind::RateLimited, 1),
            Some(Duration::from_secs(900))
        );

        let short_hint = AttemptOutcome::RateLimited {
            retry_after: Duration::from_secs(30),
            detail: String::new(),
        };
        assert_eq!(policy.delay_after(&short_hint, 1), Some(Duration::from_secs(900)));

        let long_hint = AttemptOutcome::RateLimited {
            retry_after: Duration::from_secs(3600),
            detail: String::new(),
        };
        assert_eq!(policy.delay_after(&long_hint, 1), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_exponential_backoff_capped() {
        let policy = RetryPolicy::fixed(Duration::from_secs(60))
            .with_backoff(2.0, Duration::from_secs(300));
        assert_eq!(
            policy.next_delay(OutcomeKind::CapacityExhausted, 1),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            policy.next_delay(OutcomeKind::CapacityExhausted, 2),
            Some(Duration::from_secs(120))
        );
        assert_eq!(
            policy.next_delay(OutcomeKind::CapacityExhausted, 3),
            Some(Duration::from_secs(240))
        );
        assert_eq!(
            policy.next_delay(OutcomeKind::CapacityExhausted, 4),
            Some(Duration::from_secs(300))
        );
        assert_eq!(
            policy.next_delay(OutcomeKind::CapacityExhausted, u32::MAX),
            Some(Duration::from_secs(300))
        );
    }
}
