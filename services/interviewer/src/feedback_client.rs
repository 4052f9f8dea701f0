use anyhow::{Context, Result};
use async_trait::async_trait;
use interview_core::services::{
    FeedbackId, FeedbackRequest, FeedbackService, IdentityProvider, UserIdentity,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateFeedbackResponse {
    success: bool,
    feedback_id: Option<String>,
    error: Option<String>,
}

impl CreateFeedbackResponse {
    fn into_feedback_id(self) -> Result<FeedbackId> {
        match (self.success, self.feedback_id) {
            (true, Some(id)) => Ok(FeedbackId(id)),
            (true, None) => Err(anyhow::anyhow!("feedback service returned no feedback id")),
            (false, _) => Err(anyhow::anyhow!(
                "feedback service reported failure: {}",
                self.error.as_deref().unwrap_or("no reason given")
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CurrentUserResponse {
    user: Option<UserIdentity>,
}

/// HTTP client for the service that stores interview feedback and knows the signed-in user.
pub struct FeedbackClient {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl FeedbackClient {
    pub fn new(base_url: &str, token: Option<SecretString>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

#[async_trait]
impl FeedbackService for FeedbackClient {
    async fn create_feedback(&self, request: FeedbackRequest) -> Result<FeedbackId> {
        tracing::debug!(
            "submitting {} transcript lines for interview {}",
            request.transcript.len(),
            request.interview_id
        );
        let response = self
            .authorize(self.client.post(self.endpoint("feedback")))
            .json(&request)
            .send()
            .await
            .context("Failed to reach the feedback service")?
            .error_for_status()
            .context("Feedback service rejected the request")?
            .json::<CreateFeedbackResponse>()
            .await
            .context("Failed to parse the feedback response")?;
        response.into_feedback_id()
    }
}

#[async_trait]
impl IdentityProvider for FeedbackClient {
    async fn current_user(&self) -> Result<Option<UserIdentity>> {
        let response = self
            .authorize(self.client.get(self.endpoint("me")))
            .send()
            .await
            .context("Failed to reach the identity endpoint")?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let body = response
            .error_for_status()
            .context("Identity endpoint rejected the request")?
            .json::<CurrentUserResponse>()
            .await
            .context("Failed to parse the identity response")?;
        Ok(body.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = FeedbackClient::new("https://interviews.test/api/", None);
        assert_eq!(client.endpoint("feedback"), "https://interviews.test/api/feedback");
    }

    #[test]
    fn test_successful_response_yields_id() {
        let response: CreateFeedbackResponse =
            serde_json::from_str(r#"{"success": true, "feedbackId": "fb-9"}"#).unwrap();
        assert_eq!(response.into_feedback_id().unwrap(), FeedbackId("fb-9".to_string()));
    }

    #[test]
    fn test_failure_response_is_an_error() {
        let response: CreateFeedbackResponse =
            serde_json::from_str(r#"{"success": false, "error": "transcript too short"}"#)
                .unwrap();
        let err = response.into_feedback_id().unwrap_err();
        assert!(err.to_string().contains("transcript too short"));

        let response: CreateFeedbackResponse =
            serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(response.into_feedback_id().is_err());
    }

    #[test]
    fn test_signed_out_identity() {
        let body: CurrentUserResponse = serde_json::from_str(r#"{"user": null}"#).unwrap();
        assert!(body.user.is_none());

        let body: CurrentUserResponse =
            serde_json::from_str(r#"{"user": {"id": "u-1", "name": "Ana"}}"#).unwrap();
        assert_eq!(body.user.unwrap().name, "Ana");
    }
}
