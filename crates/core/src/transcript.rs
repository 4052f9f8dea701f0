use serde::{Deserialize, Serialize};
use voice_realtime_types::{MessageRole, TranscriptMessage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub role: MessageRole,
    pub content: String,
}

/// Final transcript lines of the current call, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    lines: Vec<TranscriptLine>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends final transcripts. Partial ones are dropped and yield `None`.
    pub fn record(&mut self, message: &TranscriptMessage) -> Option<TranscriptLine> {
        if !message.is_final() || message.transcript().trim().is_empty() {
            return None;
        }
        let line = TranscriptLine {
            role: message.role(),
            content: message.transcript().to_string(),
        };
        self.lines.push(line.clone());
        Some(line)
    }

    pub fn lines(&self) -> &[TranscriptLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_realtime_types::TranscriptType;

    #[test]
    fn test_only_final_transcripts_are_kept() {
        let mut transcript = Transcript::new();
        let partial = TranscriptMessage::new(TranscriptType::Partial, MessageRole::User, "Hel");
        let done = TranscriptMessage::final_from(MessageRole::User, "Hello there");

        assert_eq!(transcript.record(&partial), None);
        let line = transcript.record(&done).unwrap();
        assert_eq!(line.content, "Hello there");
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.lines()[0].role, MessageRole::User);
    }

    #[test]
    fn test_blank_final_is_ignored() {
        let mut transcript = Transcript::new();
        let blank = TranscriptMessage::final_from(MessageRole::Assistant, "   ");
        assert_eq!(transcript.record(&blank), None);
        assert!(transcript.is_empty());
    }
}
