use crate::error::CallFailure;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EjectionPhase {
    Clear,
    Handling,
    /// Retries ran out; the call is over.
    Ejected,
}

/// Guards against handling the same ejection twice.
#[derive(Debug, Default)]
pub struct EjectionState {
    is_ejected: bool,
    is_handling: bool,
    ejection_time: Option<Instant>,
    ejection_error: Option<CallFailure>,
}

impl EjectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> EjectionPhase {
        if self.is_ejected {
            EjectionPhase::Ejected
        } else if self.is_handling {
            EjectionPhase::Handling
        } else {
            EjectionPhase::Clear
        }
    }

    /// Claims the ejection. Returns false if one is already being handled or
    /// the session is already marked ejected.
    pub fn try_begin(&mut self, failure: &CallFailure, now: Instant) -> bool {
        if self.is_ejected || self.is_handling {
            return false;
        }
        self.is_handling = true;
        self.ejection_time = Some(now);
        self.ejection_error = Some(failure.clone());
        true
    }

    /// The scheduled retry is running; a later ejection is a new episode.
    pub fn retry_started(&mut self) {
        self.is_handling = false;
    }

    pub fn mark_exhausted(&mut self) {
        self.is_ejected = true;
        self.is_handling = false;
    }

    pub fn is_ejected(&self) -> bool {
        self.is_ejected
    }

    pub fn is_handling(&self) -> bool {
        self.is_handling
    }

    pub fn ejection_time(&self) -> Option<Instant> {
        self.ejection_time
    }

    pub fn ejection_error(&self) -> Option<&CallFailure> {
        self.ejection_error.as_ref()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
