use crate::reconnect::FailureKind;
use std::time::Duration;

/// How long to wait before the n-th retry (zero-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^attempts`, capped at `max`.
    Exponential { base: Duration, max: Duration },
    /// `base + step * attempts`.
    Linear { base: Duration, step: Duration },
}

impl Backoff {
    pub fn delay(&self, attempts: u32) -> Duration {
        match *self {
            Backoff::Exponential { base, max } => {
                let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
            Backoff::Linear { base, step } => base.saturating_add(step.saturating_mul(attempts)),
        }
    }
}

/// Retry budget and timing for one failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Dispose the provider instance and build a fresh one before retrying.
    pub replace_instance: bool,
}

impl RetryPolicy {
    pub fn connection_loss() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(1000),
                max: Duration::from_millis(10_000),
            },
            replace_instance: false,
        }
    }

    pub fn ejection() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Linear {
                base: Duration::from_millis(3000),
                step: Duration::from_millis(2000),
            },
            replace_instance: true,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResilienceSettings {
    /// How often the liveness check runs while connected.
    pub liveness_interval: Duration,
    /// Idle time after which a connected session is considered lost.
    pub staleness_threshold: Duration,
    /// Period of the activity-refreshing keep-alive. `None` disables it.
    pub keep_alive_interval: Option<Duration>,
    pub connection_loss: RetryPolicy,
    pub ejection: RetryPolicy,
    /// Pause between disposing an ejected instance and building its replacement.
    pub settle_delay: Duration,
    /// Capacity of the command and event channels.
    pub channel_capacity: usize,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            liveness_interval: Duration::from_secs(10),
            staleness_threshold: Duration::from_secs(30),
            keep_alive_interval: Some(Duration::from_secs(20)),
            connection_loss: RetryPolicy::connection_loss(),
            ejection: RetryPolicy::ejection(),
            settle_delay: Duration::from_millis(500),
            channel_capacity: 128,
        }
    }
}

impl ResilienceSettings {
    pub fn policy(&self, kind: FailureKind) -> RetryPolicy {
        match kind {
            FailureKind::ConnectionLoss => self.connection_loss,
            FailureKind::Ejection => self.ejection,
        }
    }

    pub fn with_keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    pub fn with_staleness_threshold(mut self, threshold: Duration) -> Self {
        self.staleness_threshold = threshold;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, max_attempts: u32) -> Self {
        self.connection_loss = self.connection_loss.with_max_attempts(max_attempts);
        self
    }

    pub fn with_max_ejection_reconnect_attempts(mut self, max_attempts: u32) -> Self {
        self.ejection = self.ejection.with_max_attempts(max_attempts);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(policy: &RetryPolicy, attempts: u32) -> u128 {
        policy.backoff.delay(attempts).as_millis()
    }

    #[test]
    fn test_connection_loss_backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::connection_loss();
        let delays: Vec<u128> = (0..6).map(|n| millis(&policy, n)).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10_000, 10_000]);
    }

    #[test]
    fn test_exponential_backoff_survives_large_attempt_counts() {
        let policy = RetryPolicy::connection_loss();
        assert_eq!(millis(&policy, 40), 10_000);
    }

    #[test]
    fn test_ejection_backoff_grows_linearly() {
        let policy = RetryPolicy::ejection();
        let delays: Vec<u128> = (0..3).map(|n| millis(&policy, n)).collect();
        assert_eq!(delays, vec![3000, 5000, 7000]);
    }

    #[test]
    fn test_ejection_budget_is_smaller_than_connection_loss_budget() {
        let settings = ResilienceSettings::default();
        assert!(settings.ejection.max_attempts < settings.connection_loss.max_attempts);
        assert!(settings.ejection.replace_instance);
        assert!(!settings.connection_loss.replace_instance);
    }

    #[test]
    fn test_builders_override_budgets() {
        let settings = ResilienceSettings::default()
            .with_max_reconnect_attempts(2)
            .with_max_ejection_reconnect_attempts(1)
            .with_keep_alive(None);
        assert_eq!(settings.policy(FailureKind::ConnectionLoss).max_attempts, 2);
        assert_eq!(settings.policy(FailureKind::Ejection).max_attempts, 1);
        assert_eq!(settings.keep_alive_interval, None);
    }
}
