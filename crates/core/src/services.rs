//! Collaborators the orchestrator depends on but does not implement.

use crate::transcript::TranscriptLine;
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub interview_id: String,
    pub user_id: String,
    pub transcript: Vec<TranscriptLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackId(pub String);

/// Turns a finished interview transcript into stored feedback.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FeedbackService: Send + Sync {
    async fn create_feedback(&self, request: FeedbackRequest) -> Result<FeedbackId>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `None` when nobody is signed in.
    async fn current_user(&self) -> Result<Option<UserIdentity>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicrophonePermission {
    Granted,
    Prompt,
    Denied,
}

pub trait MicrophoneGate: Send + Sync {
    fn permission(&self) -> MicrophonePermission;
}

/// A gate that always reports the same answer.
pub struct FixedMicrophone(pub MicrophonePermission);

impl MicrophoneGate for FixedMicrophone {
    fn permission(&self) -> MicrophonePermission {
        self.0
    }
}

/// An identity that never changes, for headless runs.
pub struct StaticIdentity(pub UserIdentity);

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Result<Option<UserIdentity>> {
        Ok(Some(self.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_realtime_types::MessageRole;

    #[test]
    fn test_feedback_request_wire_format() {
        let request = FeedbackRequest {
            interview_id: "iv-1".to_string(),
            user_id: "user-1".to_string(),
            transcript: vec![TranscriptLine {
                role: MessageRole::Assistant,
                content: "Tell me about yourself.".to_string(),
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["interviewId"], "iv-1");
        assert_eq!(json["userId"], "user-1");
        assert_eq!(json["transcript"][0]["role"], "assistant");
    }

    #[tokio::test]
    async fn test_static_identity() {
        let identity = StaticIdentity(UserIdentity {
            id: "user-1".to_string(),
            name: "Ana".to_string(),
        });
        let user = identity.current_user().await.unwrap().unwrap();
        assert_eq!(user.name, "Ana");
    }
}
