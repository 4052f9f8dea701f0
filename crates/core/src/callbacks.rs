use crate::error::CallFailure;

/// Hooks fired by the resilience subsystem. All methods default to no-ops.
pub trait ConnectionCallbacks: Send + Sync {
    fn on_connection_lost(&self, _failure: &CallFailure) {}

    fn on_reconnect_success(&self) {}

    fn on_reconnect_failed(&self, _failure: &CallFailure) {}

    fn on_ejection(&self, _failure: &CallFailure) {}
}

pub struct NoopCallbacks;

impl ConnectionCallbacks for NoopCallbacks {}

/// Writes every hook invocation to the log.
pub struct LoggingCallbacks;

impl ConnectionCallbacks for LoggingCallbacks {
    fn on_connection_lost(&self, failure: &CallFailure) {
        tracing::warn!("connection lost: {}", failure);
    }

    fn on_reconnect_success(&self) {
        tracing::info!("reconnected");
    }

    fn on_reconnect_failed(&self, failure: &CallFailure) {
        tracing::error!("giving up on reconnecting: {}", failure);
    }

    fn on_ejection(&self, failure: &CallFailure) {
        tracing::warn!("ejected from session: {}", failure);
    }
}

#[cfg(test)]
pub(crate) use recording::RecordingCallbacks;

#[cfg(test)]
mod recording {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Hook {
        ConnectionLost(CallFailure),
        ReconnectSuccess,
        ReconnectFailed(CallFailure),
        Ejection(CallFailure),
    }

    #[derive(Default)]
    pub(crate) struct RecordingCallbacks {
        hooks: Mutex<Vec<Hook>>,
    }

    impl RecordingCallbacks {
        fn push(&self, hook: Hook) {
            self.hooks.lock().unwrap().push(hook);
        }

        pub(crate) fn hooks(&self) -> Vec<Hook> {
            self.hooks.lock().unwrap().clone()
        }

        pub(crate) fn ejections(&self) -> usize {
            self.count(|hook| matches!(hook, Hook::Ejection(_)))
        }

        pub(crate) fn connection_losses(&self) -> usize {
            self.count(|hook| matches!(hook, Hook::ConnectionLost(_)))
        }

        pub(crate) fn successes(&self) -> usize {
            self.count(|hook| matches!(hook, Hook::ReconnectSuccess))
        }

        pub(crate) fn failures(&self) -> usize {
            self.count(|hook| matches!(hook, Hook::ReconnectFailed(_)))
        }

        fn count(&self, predicate: impl Fn(&Hook) -> bool) -> usize {
            self.hooks.lock().unwrap().iter().filter(|hook| predicate(hook)).count()
        }
    }

    impl ConnectionCallbacks for RecordingCallbacks {
        fn on_connection_lost(&self, failure: &CallFailure) {
            self.push(Hook::ConnectionLost(failure.clone()));
        }

        fn on_reconnect_success(&self) {
            self.push(Hook::ReconnectSuccess);
        }

        fn on_reconnect_failed(&self, failure: &CallFailure) {
            self.push(Hook::ReconnectFailed(failure.clone()));
        }

        fn on_ejection(&self, failure: &CallFailure) {
            self.push(Hook::Ejection(failure.clone()));
        }
    }
}
