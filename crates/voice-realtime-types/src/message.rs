#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptType {
    Partial,
    Final,
}

/// Payload of a `message` server event.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ConversationMessage {
    #[serde(rename = "transcript")]
    Transcript(TranscriptMessage),
    // Function calls, status updates and the like are not used here.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMessage {
    transcript_type: TranscriptType,
    role: MessageRole,
    transcript: String,
}

impl TranscriptMessage {
    pub fn new(transcript_type: TranscriptType, role: MessageRole, transcript: &str) -> Self {
        Self {
            transcript_type,
            role,
            transcript: transcript.to_string(),
        }
    }

    pub fn final_from(role: MessageRole, transcript: &str) -> Self {
        Self::new(TranscriptType::Final, role, transcript)
    }

    pub fn transcript_type(&self) -> TranscriptType {
        self.transcript_type
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn is_final(&self) -> bool {
        self.transcript_type == TranscriptType::Final
    }
}

/// A message injected into the conversation by the client.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: MessageRole::System,
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: MessageRole::User,
            content: content.to_string(),
        }
    }
}
