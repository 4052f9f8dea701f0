//! Maps provider error text and end reasons onto an [`ErrorCategory`].
//!
//! Structured reasons win when the provider sends one. Otherwise the message is
//! matched case-insensitively against marker lists, checked in a fixed order so
//! that a hangup mentioning "meeting has ended" stays a graceful end.

use crate::error::{CallFailure, ErrorCategory};
use std::time::Duration;
use voice_realtime_types::EndReason;

const GRACEFUL_END_MARKERS: &[&str] = &[
    "ended call with hangup",
    "hangup task",
    "ended reason",
    "assistant-ended-call",
    "customer-ended-call",
];

const EJECTION_MARKERS: &[&str] = &[
    "meeting ended due to ejection",
    "meeting has ended",
    "ejection",
    "ejected",
];

const AUTHORIZATION_MARKERS: &[&str] = &[
    "domain",
    "unauthorized",
    "unauthorised",
    "forbidden",
    "invalid api key",
    "invalid key",
];

const PERMISSION_MARKERS: &[&str] = &[
    "microphone",
    "permission denied",
    "notallowederror",
    "getusermedia",
];

const CONNECTION_LOSS_MARKERS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "disconnect",
    "connection lost",
    "connection closed",
    "connection reset",
    "websocket",
    "offline",
];

const RULES: &[(ErrorCategory, &[&str])] = &[
    (ErrorCategory::GracefulEnd, GRACEFUL_END_MARKERS),
    (ErrorCategory::Ejection, EJECTION_MARKERS),
    (ErrorCategory::Authorization, AUTHORIZATION_MARKERS),
    (ErrorCategory::Permission, PERMISSION_MARKERS),
    (ErrorCategory::ConnectionLoss, CONNECTION_LOSS_MARKERS),
];

pub fn classify_message(message: &str) -> ErrorCategory {
    let lowered = message.to_lowercase();
    RULES
        .iter()
        .find(|(_, markers)| markers.iter().any(|marker| lowered.contains(marker)))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

/// `None` for reasons that carry no classification of their own.
pub fn classify_reason(reason: EndReason) -> Option<ErrorCategory> {
    match reason {
        EndReason::AssistantEndedCall | EndReason::CustomerEndedCall => {
            Some(ErrorCategory::GracefulEnd)
        }
        EndReason::Ejected => Some(ErrorCategory::Ejection),
        EndReason::Unauthorized => Some(ErrorCategory::Authorization),
        EndReason::MicrophonePermissionDenied => Some(ErrorCategory::Permission),
        EndReason::NetworkError => Some(ErrorCategory::ConnectionLoss),
        EndReason::Unknown => None,
    }
}

/// Classifies an `error` event.
pub fn classify(message: &str, reason: Option<EndReason>) -> CallFailure {
    let category = reason
        .and_then(classify_reason)
        .unwrap_or_else(|| classify_message(message));
    CallFailure::new(category, message)
}

/// Classifies a `call-end` event. Ends that match nothing are treated as graceful.
pub fn classify_call_end(reason: Option<EndReason>, message: Option<&str>) -> CallFailure {
    let text = message.unwrap_or("call ended");
    let category = match reason.and_then(classify_reason) {
        Some(category) => category,
        None => match classify_message(text) {
            ErrorCategory::Unknown => ErrorCategory::GracefulEnd,
            category => category,
        },
    };
    CallFailure::new(category, text)
}

/// Classifies an error returned by a provider operation, using the full context chain.
pub fn classify_error(error: &anyhow::Error) -> CallFailure {
    let message = format!("{:#}", error);
    let category = classify_message(&message);
    CallFailure::new(category, message)
}

/// A session that went quiet for too long. Always a connection loss.
pub fn staleness(idle: Duration) -> CallFailure {
    CallFailure::new(
        ErrorCategory::ConnectionLoss,
        format!("no activity for {}s, connection is stale", idle.as_secs()),
    )
}
