//now people using the types library can use these types
pub mod call;
pub mod events;
pub mod message;
pub mod reason;

//re-export types for easier access
pub use call::{AssistantConfig, CallHandle, CallTarget, StartOptions};
pub use events::{ClientEvent, ServerEvent};
pub use message::{ChatMessage, ConversationMessage, MessageRole, TranscriptMessage, TranscriptType};
pub use reason::EndReason;
