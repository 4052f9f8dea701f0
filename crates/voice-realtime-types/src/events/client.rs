use crate::call::{CallTarget, StartOptions};
use crate::message::ChatMessage;

/// `call.start` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CallStartEvent {
    event_id: Option<String>,

    /// Workflow reference or inline assistant
    target: CallTarget,
    options: StartOptions,
}

impl CallStartEvent {
    pub fn new(target: CallTarget, options: StartOptions) -> Self {
        Self {
            event_id: None,
            target,
            options,
        }
    }
    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn target(&self) -> &CallTarget {
        &self.target
    }

    pub fn options(&self) -> &StartOptions {
        &self.options
    }
}

/// `call.stop` event
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CallStopEvent {
    event_id: Option<String>,
}

impl CallStopEvent {
    pub fn new() -> Self {
        Self { event_id: None }
    }
}

/// `add-message` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AddMessageEvent {
    event_id: Option<String>,

    /// The message to append to the conversation
    message: ChatMessage,
}

impl AddMessageEvent {
    pub fn new(message: ChatMessage) -> Self {
        Self {
            event_id: None,
            message,
        }
    }

    pub fn message(&self) -> &ChatMessage {
        &self.message
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlAction {
    MuteMicrophone,
    UnmuteMicrophone,
}

/// `control` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ControlEvent {
    event_id: Option<String>,
    control: ControlAction,
}

impl ControlEvent {
    pub fn new(control: ControlAction) -> Self {
        Self {
            event_id: None,
            control,
        }
    }

    pub fn mute(muted: bool) -> Self {
        if muted {
            Self::new(ControlAction::MuteMicrophone)
        } else {
            Self::new(ControlAction::UnmuteMicrophone)
        }
    }

    pub fn control(&self) -> ControlAction {
        self.control
    }
}

/// `say` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SayEvent {
    event_id: Option<String>,

    /// Text the assistant should speak verbatim
    content: String,
    end_call_after_spoken: bool,
}

impl SayEvent {
    pub fn new(content: &str) -> Self {
        Self {
            event_id: None,
            content: content.to_string(),
            end_call_after_spoken: false,
        }
    }

    pub fn with_end_call_after_spoken(mut self, end_call: bool) -> Self {
        self.end_call_after_spoken = end_call;
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn end_call_after_spoken(&self) -> bool {
        self.end_call_after_spoken
    }
}
