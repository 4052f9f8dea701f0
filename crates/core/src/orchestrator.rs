//! The handle UIs talk to. All call state lives in a single supervisor task;
//! the handle only sends it commands and watches what it publishes.

use crate::callbacks::{ConnectionCallbacks, NoopCallbacks};
use crate::connection::SessionConfig;
use crate::ejection::EjectionPhase;
use crate::error::{CallError, CallFailure, ErrorCategory};
use crate::provider::{ProviderFactory, ProviderMessage};
use crate::reconnect::FailureKind;
use crate::services::{
    FeedbackService, FixedMicrophone, IdentityProvider, MicrophoneGate, MicrophonePermission,
};
use crate::settings::ResilienceSettings;
use crate::supervisor::{Collaborators, Command, Supervisor};
use crate::transcript::TranscriptLine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use voice_realtime_types::{CallTarget, StartOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallStatus {
    Inactive,
    Connecting,
    Active,
    Finished,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallStatus::Inactive => "INACTIVE",
            CallStatus::Connecting => "CONNECTING",
            CallStatus::Active => "ACTIVE",
            CallStatus::Finished => "FINISHED",
        };
        f.write_str(name)
    }
}

/// What happens once the call is over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallMode {
    /// Interview generation: nothing to grade, go back home.
    #[default]
    Generate,
    /// A graded interview: submit the transcript for feedback.
    Interview { interview_id: String, user_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallConfig {
    pub target: CallTarget,
    #[serde(default)]
    pub options: StartOptions,
    #[serde(default)]
    pub mode: CallMode,
}

impl CallConfig {
    pub fn new(target: CallTarget) -> Self {
        Self {
            target,
            options: StartOptions::new(),
            mode: CallMode::Generate,
        }
    }

    pub fn with_options(mut self, options: StartOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_mode(mut self, mode: CallMode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub severity: Severity,
    pub category: Option<ErrorCategory>,
    pub message: String,
}

impl Notice {
    pub fn info(message: &str) -> Self {
        Self {
            severity: Severity::Info,
            category: None,
            message: message.to_string(),
        }
    }

    pub fn error(category: Option<ErrorCategory>, message: &str) -> Self {
        Self {
            severity: Severity::Error,
            category,
            message: message.to_string(),
        }
    }

    fn warning(category: ErrorCategory, message: &str) -> Self {
        Self {
            severity: Severity::Warning,
            category: Some(category),
            message: message.to_string(),
        }
    }

    pub fn for_failure(failure: &CallFailure) -> Self {
        let category = failure.category;
        match category {
            ErrorCategory::GracefulEnd => Self::info("The interview has ended."),
            ErrorCategory::Ejection => {
                Self::warning(category, "The interview was interrupted. Reconnecting you now.")
            }
            ErrorCategory::ConnectionLoss => {
                Self::warning(category, "Connection lost. Trying to reconnect.")
            }
            ErrorCategory::Authorization => Self::error(
                Some(category),
                "This app is not authorized to start interviews. Check the voice provider configuration.",
            ),
            ErrorCategory::Permission => Self::error(
                Some(category),
                "Microphone access is required. Allow it and try again.",
            ),
            ErrorCategory::Unknown => Self {
                severity: Severity::Error,
                category: Some(category),
                message: format!("Something went wrong: {}", failure.message),
            },
        }
    }

    pub fn exhausted(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Ejection => Self::error(
                Some(ErrorCategory::Ejection),
                "The interview session ended unexpectedly. Please start a new one.",
            ),
            FailureKind::ConnectionLoss => Self::error(
                Some(ErrorCategory::ConnectionLoss),
                "Could not reconnect to the interview. Check your connection and try again.",
            ),
        }
    }
}

/// Where the UI should go after a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "page", rename_all = "snake_case")]
pub enum Redirect {
    Home,
    Feedback {
        interview_id: String,
        feedback_id: String,
    },
}

impl Redirect {
    pub fn path(&self) -> String {
        match self {
            Redirect::Home => "/".to_string(),
            Redirect::Feedback { interview_id, .. } => format!("/interview/{}/feedback", interview_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    Status { status: CallStatus },
    Transcript { line: TranscriptLine },
    Speaking { speaking: bool },
    Notice(Notice),
    Reconnecting {
        kind: FailureKind,
        attempt: u32,
        delay_ms: u64,
    },
    Reconnected { kind: FailureKind },
    Redirect { to: Redirect },
}

/// Point-in-time view of the supervisor's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSnapshot {
    pub status: CallStatus,
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub ejection_reconnect_attempts: u32,
    pub max_ejection_reconnect_attempts: u32,
    pub ejection: EjectionPhase,
    pub ejection_error: Option<CallFailure>,
    pub pending_reconnect: Option<FailureKind>,
    pub saved_session: Option<SessionConfig>,
    pub provider_active: bool,
    pub monitoring: bool,
    pub muted: bool,
    pub idle_ms: u64,
    pub transcript_lines: usize,
}

pub struct OrchestratorBuilder {
    factory: Arc<dyn ProviderFactory>,
    settings: ResilienceSettings,
    callbacks: Arc<dyn ConnectionCallbacks>,
    feedback: Option<Arc<dyn FeedbackService>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    microphone: Arc<dyn MicrophoneGate>,
}

impl OrchestratorBuilder {
    pub fn with_settings(mut self, settings: ResilienceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_callbacks(mut self, callbacks: Arc<dyn ConnectionCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackService>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// When set, `username` and `userid` call variables are filled from the signed-in user.
    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_microphone(mut self, microphone: Arc<dyn MicrophoneGate>) -> Self {
        self.microphone = microphone;
        self
    }

    /// Spawns the supervisor task. Must be called from within a tokio runtime.
    pub fn build(self) -> CallOrchestrator {
        let capacity = self.settings.channel_capacity.max(1);
        let (commands, command_rx) = mpsc::channel(capacity);
        let (status_tx, status) = watch::channel(CallStatus::Inactive);
        let (events, _) = broadcast::channel(capacity);

        let supervisor = Supervisor::new(
            self.settings,
            self.factory,
            Collaborators {
                callbacks: self.callbacks,
                feedback: self.feedback,
                identity: self.identity,
                microphone: self.microphone,
            },
            status_tx,
            events.clone(),
        );
        tokio::spawn(supervisor.run(command_rx));

        CallOrchestrator {
            commands,
            status,
            events,
        }
    }
}

/// Cloneable handle to a call supervisor. The supervisor shuts down once every
/// handle is dropped.
#[derive(Clone)]
pub struct CallOrchestrator {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<CallStatus>,
    events: broadcast::Sender<CallEvent>,
}

impl CallOrchestrator {
    pub fn builder(factory: Arc<dyn ProviderFactory>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            factory,
            settings: ResilienceSettings::default(),
            callbacks: Arc::new(NoopCallbacks),
            feedback: None,
            identity: None,
            microphone: Arc::new(FixedMicrophone(MicrophonePermission::Granted)),
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CallError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| CallError::Closed)?;
        response.await.map_err(|_| CallError::Closed)
    }

    /// Starts a call. Returns once the provider accepted the start request, or a
    /// recoverable failure was handed to the reconnection engine.
    pub async fn start_call(&self, config: CallConfig) -> Result<(), CallError> {
        self.request(|reply| Command::StartCall { config, reply })
            .await?
    }

    /// Ends the call, cancelling every pending timer, and runs the post-call flow.
    pub async fn end_call(&self) -> Result<(), CallError> {
        self.request(|reply| Command::EndCall { reply }).await
    }

    pub async fn send(&self, message: ProviderMessage) -> Result<(), CallError> {
        self.request(|reply| Command::Send { message, reply })
            .await?
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), CallError> {
        self.request(|reply| Command::SetMuted { muted, reply })
            .await?
    }

    pub async fn is_muted(&self) -> Result<bool, CallError> {
        self.request(|reply| Command::IsMuted { reply }).await
    }

    pub async fn snapshot(&self) -> Result<ConnectionSnapshot, CallError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Forgets a terminal ejection so the next call starts clean.
    pub async fn clear_ejection(&self) -> Result<(), CallError> {
        self.request(|reply| Command::ClearEjection { reply }).await
    }

    /// Tears everything down and stops the supervisor.
    pub async fn shutdown(&self) -> Result<(), CallError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn status(&self) -> CallStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<CallStatus> {
        self.status.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }
}
