/// Structured reason attached to `call-end` and `error` events.
///
/// Providers that do not send one leave the field out; anything this crate does
/// not know about deserializes to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    AssistantEndedCall,
    CustomerEndedCall,
    Ejected,
    Unauthorized,
    MicrophonePermissionDenied,
    NetworkError,
    #[serde(other)]
    Unknown,
}

impl EndReason {
    pub fn is_hangup(&self) -> bool {
        matches!(self, EndReason::AssistantEndedCall | EndReason::CustomerEndedCall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecognised_reason_is_unknown() {
        let reason: EndReason = serde_json::from_str("\"silence-timed-out\"").unwrap();
        assert_eq!(reason, EndReason::Unknown);
    }

    #[test]
    fn test_hangup_reasons() {
        assert!(EndReason::AssistantEndedCall.is_hangup());
        assert!(EndReason::CustomerEndedCall.is_hangup());
        assert!(!EndReason::Ejected.is_hangup());
    }
}
