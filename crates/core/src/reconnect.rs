use crate::connection::{ConnectionState, SessionConfig};
use crate::error::ErrorCategory;
use crate::provider::ProviderSlot;
use crate::settings::RetryPolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Sleep};
use voice_realtime_types::CallHandle;

/// The two recoverable failure kinds. Each has its own attempt counter and policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ConnectionLoss,
    Ejection,
}

impl FailureKind {
    pub fn from_category(category: ErrorCategory) -> Option<Self> {
        match category {
            ErrorCategory::ConnectionLoss => Some(FailureKind::ConnectionLoss),
            ErrorCategory::Ejection => Some(FailureKind::Ejection),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ConnectionLoss => f.write_str("connection loss"),
            FailureKind::Ejection => f.write_str("ejection"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Schedule { attempt: u32, delay: Duration },
    Exhausted,
}

/// Decides whether another attempt fits the budget. Does not touch the counters:
/// they are only bumped when the scheduled attempt actually fires.
pub fn plan_retry(state: &ConnectionState, kind: FailureKind, policy: &RetryPolicy) -> RetryDecision {
    if state.saved_session().is_none() {
        return RetryDecision::Exhausted;
    }
    let attempts = state.attempts(kind);
    if attempts >= policy.max_attempts {
        return RetryDecision::Exhausted;
    }
    RetryDecision::Schedule {
        attempt: attempts + 1,
        delay: policy.backoff.delay(attempts),
    }
}

struct PendingReconnect {
    kind: FailureKind,
    attempt: u32,
    deadline: Instant,
    sleep: Pin<Box<Sleep>>,
}

/// The single pending reconnect timer.
#[derive(Default)]
pub struct ReconnectSchedule {
    pending: Option<PendingReconnect>,
}

impl ReconnectSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, kind: FailureKind, attempt: u32, delay: Duration) {
        if let Some(previous) = self.pending.as_ref() {
            tracing::debug!(
                "replacing pending {} reconnect (attempt {})",
                previous.kind,
                previous.attempt
            );
        }
        let deadline = Instant::now() + delay;
        self.pending = Some(PendingReconnect {
            kind,
            attempt,
            deadline,
            sleep: Box::pin(tokio::time::sleep_until(deadline)),
        });
    }

    pub fn cancel(&mut self) -> Option<FailureKind> {
        self.pending.take().map(|pending| pending.kind)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_kind(&self) -> Option<FailureKind> {
        self.pending.as_ref().map(|pending| pending.kind)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.deadline)
    }

    /// Resolves when the pending timer fires and clears it. Pends forever when idle.
    pub async fn fired(&mut self) -> FailureKind {
        let Some(pending) = self.pending.as_mut() else {
            return std::future::pending().await;
        };
        pending.sleep.as_mut().await;
        let kind = pending.kind;
        self.pending = None;
        kind
    }
}

/// Brings the saved session back up. Ejection recovery disposes the current
/// instance and waits for it to settle before building a replacement; generic
/// recovery reuses whatever instance is live.
pub(crate) async fn restart_session(
    slot: &mut ProviderSlot,
    session: &SessionConfig,
    policy: &RetryPolicy,
    settle_delay: Duration,
) -> Result<CallHandle> {
    if policy.replace_instance {
        slot.teardown().await;
        tokio::time::sleep(settle_delay).await;
    }
    let provider = slot.acquire()?;
    provider.start(&session.target, &session.options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_realtime_types::{CallTarget, StartOptions};

    fn session() -> SessionConfig {
        SessionConfig::new(CallTarget::workflow("workflow-123"), StartOptions::new())
    }

    #[test]
    fn test_plan_requires_saved_session() {
        let state = ConnectionState::new();
        let decision = plan_retry(&state, FailureKind::Ejection, &RetryPolicy::ejection());
        assert_eq!(decision, RetryDecision::Exhausted);
    }

    #[test]
    fn test_plan_follows_backoff_and_budget() {
        let mut state = ConnectionState::new();
        state.save_session(session());
        let policy = RetryPolicy::ejection();

        let mut delays = Vec::new();
        while let RetryDecision::Schedule { attempt, delay } =
            plan_retry(&state, FailureKind::Ejection, &policy)
        {
            assert_eq!(state.record_attempt(FailureKind::Ejection), attempt);
            delays.push(delay.as_millis());
        }
        assert_eq!(delays, vec![3000, 5000, 7000]);
        assert_eq!(state.attempts(FailureKind::ConnectionLoss), 0);
    }

    #[test]
    fn test_kind_from_category() {
        assert_eq!(
            FailureKind::from_category(ErrorCategory::Ejection),
            Some(FailureKind::Ejection)
        );
        assert_eq!(FailureKind::from_category(ErrorCategory::Permission), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_fires_once() {
        let mut schedule = ReconnectSchedule::new();
        schedule.schedule(FailureKind::ConnectionLoss, 1, Duration::from_millis(1000));
        assert_eq!(schedule.pending_kind(), Some(FailureKind::ConnectionLoss));

        let started = Instant::now();
        assert_eq!(schedule.fired().await, FailureKind::ConnectionLoss);
        assert!(started.elapsed() >= Duration::from_millis(1000));
        assert!(!schedule.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_schedule_never_fires() {
        let mut schedule = ReconnectSchedule::new();
        schedule.schedule(FailureKind::Ejection, 1, Duration::from_millis(3000));
        assert_eq!(schedule.cancel(), Some(FailureKind::Ejection));

        let fired = tokio::time::timeout(Duration::from_secs(60), schedule.fired()).await;
        assert!(fired.is_err());
    }
}
