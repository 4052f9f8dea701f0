//! A scripted interview for `--simulate` runs. It includes an ejection in the
//! middle so the recovery path can be watched without a real provider.

use interview_core::ProviderEvent;
use interview_core::types::{EndReason, MessageRole, TranscriptMessage};
use std::time::Duration;

fn say(role: MessageRole, text: &str) -> ProviderEvent {
    ProviderEvent::Transcript(TranscriptMessage::final_from(role, text))
}

pub fn demo_script() -> Vec<(Duration, ProviderEvent)> {
    let secs = Duration::from_secs;
    vec![
        (secs(1), ProviderEvent::SpeechStart),
        (
            Duration::ZERO,
            say(
                MessageRole::Assistant,
                "Hi! Let's start with your background. What have you been working on lately?",
            ),
        ),
        (secs(1), ProviderEvent::SpeechEnd),
        (
            secs(2),
            say(
                MessageRole::User,
                "Mostly backend services in Rust, including a websocket gateway.",
            ),
        ),
        (secs(1), ProviderEvent::error("Meeting ended due to ejection")),
        // Ejection recovery waits 3s plus a short settle delay before the new instance listens.
        (
            secs(5),
            say(
                MessageRole::Assistant,
                "Sorry about that, we're back. How did you handle reconnects in that gateway?",
            ),
        ),
        (
            secs(2),
            say(
                MessageRole::User,
                "Exponential backoff with a cap, and a staleness check on the connection.",
            ),
        ),
        (
            secs(1),
            say(MessageRole::Assistant, "Great, that's all I needed. Thanks!"),
        ),
        (
            secs(1),
            ProviderEvent::call_end(Some(EndReason::AssistantEndedCall)),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_ends_with_a_hangup() {
        let script = demo_script();
        assert!(matches!(
            script.last(),
            Some((_, ProviderEvent::CallEnd { reason: Some(EndReason::AssistantEndedCall), .. }))
        ));
    }

    #[test]
    fn test_script_gives_recovery_time_after_ejection() {
        let script = demo_script();
        let ejection = script
            .iter()
            .position(|(_, event)| matches!(event, ProviderEvent::Error { .. }))
            .unwrap();
        assert!(script[ejection + 1].0 > Duration::from_millis(3500));
    }
}
