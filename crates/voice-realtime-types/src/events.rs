pub mod client;
pub mod server;

use client::*;
use server::*;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "call.start")]
    CallStart(CallStartEvent),
    #[serde(rename = "call.stop")]
    CallStop(CallStopEvent),
    #[serde(rename = "add-message")]
    AddMessage(AddMessageEvent),
    #[serde(rename = "control")]
    Control(ControlEvent),
    #[serde(rename = "say")]
    Say(SayEvent),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    // Synthesised locally when the socket closes.
    #[serde(rename = "close")]
    Close { reason: Option<String> },
    #[serde(rename = "call-start")]
    CallStarted(CallStartedEvent),
    #[serde(rename = "call-end")]
    CallEnded(CallEndedEvent),
    #[serde(rename = "speech-start")]
    SpeechStarted,
    #[serde(rename = "speech-end")]
    SpeechEnded,
    #[serde(rename = "message")]
    Message(MessageEvent),
    #[serde(rename = "error")]
    Error(ErrorEvent),
}

impl ServerEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerEvent::Close { .. } => "close",
            ServerEvent::CallStarted(_) => "call-start",
            ServerEvent::CallEnded(_) => "call-end",
            ServerEvent::SpeechStarted => "speech-start",
            ServerEvent::SpeechEnded => "speech-end",
            ServerEvent::Message(_) => "message",
            ServerEvent::Error(_) => "error",
        }
    }
}
