use crate::reconnect::FailureKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use voice_realtime_types::{CallTarget, StartOptions};

/// Everything needed to start the same call again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub target: CallTarget,
    #[serde(default)]
    pub options: StartOptions,
}

impl SessionConfig {
    pub fn new(target: CallTarget, options: StartOptions) -> Self {
        Self { target, options }
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.target.workflow_id()
    }
}

/// Liveness and retry bookkeeping for the current call.
#[derive(Debug)]
pub struct ConnectionState {
    connected: bool,
    last_activity: Instant,
    reconnect_attempts: u32,
    ejection_reconnect_attempts: u32,
    saved_session: Option<SessionConfig>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            connected: false,
            last_activity: Instant::now(),
            reconnect_attempts: 0,
            ejection_reconnect_attempts: 0,
            saved_session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn mark_connected(&mut self) {
        self.connected = true;
        self.touch();
    }

    pub fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Only a connected session can go stale.
    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        self.connected && self.idle_for(now) > threshold
    }

    pub fn save_session(&mut self, session: SessionConfig) {
        self.saved_session = Some(session);
    }

    pub fn saved_session(&self) -> Option<&SessionConfig> {
        self.saved_session.as_ref()
    }

    pub fn attempts(&self, kind: FailureKind) -> u32 {
        match kind {
            FailureKind::ConnectionLoss => self.reconnect_attempts,
            FailureKind::Ejection => self.ejection_reconnect_attempts,
        }
    }

    /// Counts an attempt that is about to run and returns the new total.
    pub fn record_attempt(&mut self, kind: FailureKind) -> u32 {
        let counter = match kind {
            FailureKind::ConnectionLoss => &mut self.reconnect_attempts,
            FailureKind::Ejection => &mut self.ejection_reconnect_attempts,
        };
        *counter = counter.saturating_add(1);
        *counter
    }

    pub fn reset_attempts(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::ConnectionLoss => self.reconnect_attempts = 0,
            FailureKind::Ejection => self.ejection_reconnect_attempts = 0,
        }
    }

    /// Back to a fresh, disconnected state with no saved session.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
