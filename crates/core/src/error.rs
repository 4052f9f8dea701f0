use crate::orchestrator::CallStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classes of call failures. Each class has exactly one recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    GracefulEnd,
    Ejection,
    ConnectionLoss,
    Authorization,
    Permission,
    Unknown,
}

impl ErrorCategory {
    /// Whether the reconnection engine may recover from this category.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Ejection | ErrorCategory::ConnectionLoss)
    }

    /// Authorization and permission problems need the user to act before a retry can help.
    pub fn needs_user_action(&self) -> bool {
        matches!(self, ErrorCategory::Authorization | ErrorCategory::Permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::GracefulEnd => "graceful_end",
            ErrorCategory::Ejection => "ejection",
            ErrorCategory::ConnectionLoss => "connection_loss",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure signal, as handed to callbacks and kept on the ejection record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{category}: {message}")]
pub struct CallFailure {
    pub category: ErrorCategory,
    pub message: String,
}

impl CallFailure {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

/// Errors returned to callers of the orchestrator handle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    #[error("a call is already in progress (status: {0})")]
    AlreadyActive(CallStatus),
    #[error("no workflow or assistant configured for the call")]
    MissingTarget,
    #[error("no signed-in user to start the interview for")]
    NotSignedIn,
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),
    #[error("voice provider refused the call: {0}")]
    Unauthorized(String),
    #[error("voice provider error: {0}")]
    Provider(String),
    #[error("no call is in progress")]
    NotConnected,
    #[error("call orchestrator has shut down")]
    Closed,
}

impl From<CallFailure> for CallError {
    fn from(failure: CallFailure) -> Self {
        match failure.category {
            ErrorCategory::Authorization => CallError::Unauthorized(failure.message),
            ErrorCategory::Permission => CallError::PermissionDenied(failure.message),
            _ => CallError::Provider(failure.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_ejection_and_connection_loss_are_retryable() {
        assert!(ErrorCategory::Ejection.is_retryable());
        assert!(ErrorCategory::ConnectionLoss.is_retryable());
        assert!(!ErrorCategory::GracefulEnd.is_retryable());
        assert!(!ErrorCategory::Authorization.is_retryable());
        assert!(!ErrorCategory::Permission.is_retryable());
        assert!(!ErrorCategory::Unknown.is_retryable());
    }

    #[test]
    fn test_failure_display_includes_category() {
        let failure = CallFailure::new(ErrorCategory::Ejection, "Meeting has ended");
        assert_eq!(failure.to_string(), "ejection: Meeting has ended");
    }

    #[test]
    fn test_failure_converts_to_call_error() {
        let unauthorized: CallError =
            CallFailure::new(ErrorCategory::Authorization, "domain not allowed").into();
        assert_eq!(
            unauthorized,
            CallError::Unauthorized("domain not allowed".to_string())
        );

        let permission: CallError =
            CallFailure::new(ErrorCategory::Permission, "NotAllowedError").into();
        assert!(matches!(permission, CallError::PermissionDenied(_)));
    }
}
