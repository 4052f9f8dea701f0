use crate::message::ConversationMessage;
use crate::reason::EndReason;

/// `call-start` event
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CallStartedEvent {
    #[serde(default)]
    call_id: Option<String>,
}

impl CallStartedEvent {
    pub fn new(call_id: &str) -> Self {
        Self {
            call_id: Some(call_id.to_string()),
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }
}

/// `call-end` event
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CallEndedEvent {
    #[serde(default)]
    reason: Option<EndReason>,
    #[serde(default)]
    message: Option<String>,
}

impl CallEndedEvent {
    pub fn new(reason: Option<EndReason>) -> Self {
        Self {
            reason,
            message: None,
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn reason(&self) -> Option<EndReason> {
        self.reason
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// `message` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageEvent {
    message: ConversationMessage,
}

impl MessageEvent {
    pub fn new(message: ConversationMessage) -> Self {
        Self { message }
    }

    pub fn message(&self) -> &ConversationMessage {
        &self.message
    }
}

/// `error` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    /// Details about the error
    error: ErrorDetails,
}

impl ErrorEvent {
    pub fn new(error: ErrorDetails) -> Self {
        Self { error }
    }

    pub fn error(&self) -> &ErrorDetails {
        &self.error
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorDetails {
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    reason: Option<EndReason>,
}

impl ErrorDetails {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            code: None,
            reason: None,
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn with_reason(mut self, reason: EndReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn reason(&self) -> Option<EndReason> {
        self.reason
    }
}
