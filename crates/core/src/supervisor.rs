use crate::callbacks::ConnectionCallbacks;
use crate::classifier;
use crate::connection::{ConnectionState, SessionConfig};
use crate::ejection::{EjectionPhase, EjectionState};
use crate::error::{CallError, CallFailure, ErrorCategory};
use crate::monitor::{ConnectionMonitor, MonitorTick};
use crate::orchestrator::{
    CallConfig, CallEvent, CallMode, CallStatus, ConnectionSnapshot, Notice, Redirect,
};
use crate::provider::{ProviderEvent, ProviderFactory, ProviderMessage, ProviderSlot};
use crate::reconnect::{self, FailureKind, ReconnectSchedule, RetryDecision};
use crate::services::{
    FeedbackRequest, FeedbackService, IdentityProvider, MicrophoneGate, MicrophonePermission,
};
use crate::settings::ResilienceSettings;
use crate::transcript::Transcript;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};
use voice_realtime_types::{CallHandle, StartOptions};

pub(crate) enum Command {
    StartCall {
        config: CallConfig,
        reply: oneshot::Sender<Result<(), CallError>>,
    },
    EndCall {
        reply: oneshot::Sender<()>,
    },
    Send {
        message: ProviderMessage,
        reply: oneshot::Sender<Result<(), CallError>>,
    },
    SetMuted {
        muted: bool,
        reply: oneshot::Sender<Result<(), CallError>>,
    },
    IsMuted {
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<ConnectionSnapshot>,
    },
    ClearEjection {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct Collaborators {
    pub(crate) callbacks: Arc<dyn ConnectionCallbacks>,
    pub(crate) feedback: Option<Arc<dyn FeedbackService>>,
    pub(crate) identity: Option<Arc<dyn IdentityProvider>>,
    pub(crate) microphone: Arc<dyn MicrophoneGate>,
}

enum Outcome {
    Completed,
    UserEnded,
    Failed(CallFailure),
}

/// Owns every piece of call state. Commands, provider events, monitor ticks and
/// reconnect timers are all handled one at a time on this task.
pub(crate) struct Supervisor {
    settings: ResilienceSettings,
    slot: ProviderSlot,
    connection: ConnectionState,
    ejection: EjectionState,
    monitor: ConnectionMonitor,
    schedule: ReconnectSchedule,
    collaborators: Collaborators,
    status: watch::Sender<CallStatus>,
    events: broadcast::Sender<CallEvent>,
    transcript: Transcript,
    mode: CallMode,
    speaking: bool,
}

impl Supervisor {
    pub(crate) fn new(
        settings: ResilienceSettings,
        factory: Arc<dyn ProviderFactory>,
        collaborators: Collaborators,
        status: watch::Sender<CallStatus>,
        events: broadcast::Sender<CallEvent>,
    ) -> Self {
        Self {
            monitor: ConnectionMonitor::new(&settings),
            settings,
            slot: ProviderSlot::new(factory),
            connection: ConnectionState::new(),
            ejection: EjectionState::new(),
            schedule: ReconnectSchedule::new(),
            collaborators,
            status,
            events,
            transcript: Transcript::new(),
            mode: CallMode::default(),
            speaking: false,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        self.dispose().await;
                        break;
                    }
                },
                Some(event) = self.slot.next_event() => self.on_provider_event(event).await,
                tick = self.monitor.tick() => self.on_monitor_tick(tick).await,
                kind = self.schedule.fired() => self.on_reconnect_due(kind).await,
            }
        }
        debug!("call supervisor stopped");
    }

    /// Returns false once the supervisor should stop.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::StartCall { config, reply } => {
                let result = self.start_call(config).await;
                let _ = reply.send(result);
            }
            Command::EndCall { reply } => {
                self.end_call().await;
                let _ = reply.send(());
            }
            Command::Send { message, reply } => {
                let result = self.send(message).await;
                let _ = reply.send(result);
            }
            Command::SetMuted { muted, reply } => {
                let result = self.set_muted(muted).await;
                let _ = reply.send(result);
            }
            Command::IsMuted { reply } => {
                let _ = reply.send(self.is_muted());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::ClearEjection { reply } => {
                debug!("clearing ejection state");
                self.ejection.reset();
                let _ = reply.send(());
            }
            Command::Shutdown { reply } => {
                self.dispose().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn current_status(&self) -> CallStatus {
        *self.status.borrow()
    }

    fn set_status(&self, status: CallStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            info!("call status {} -> {}", previous, status);
            self.emit(CallEvent::Status { status });
        }
    }

    fn set_speaking(&mut self, speaking: bool) {
        if self.speaking != speaking {
            self.speaking = speaking;
            self.emit(CallEvent::Speaking { speaking });
        }
    }

    fn emit(&self, event: CallEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn notify(&self, notice: Notice) {
        self.emit(CallEvent::Notice(notice));
    }

    async fn start_call(&mut self, config: CallConfig) -> Result<(), CallError> {
        let status = self.current_status();
        if status != CallStatus::Inactive {
            return Err(CallError::AlreadyActive(status));
        }
        if !config.target.is_present() {
            warn!("refusing to start a call without a workflow or assistant");
            self.notify(Notice::error(None, "No interview workflow is configured."));
            return Err(CallError::MissingTarget);
        }
        if self.collaborators.microphone.permission() == MicrophonePermission::Denied {
            let failure = CallFailure::new(ErrorCategory::Permission, "microphone permission denied");
            warn!("{}", failure);
            self.notify(Notice::for_failure(&failure));
            return Err(failure.into());
        }
        let options = self.resolve_identity(config.options).await?;
        let session = SessionConfig::new(config.target, options);

        // Fresh session: nothing from a previous call may leak in.
        self.schedule.cancel();
        self.monitor.stop();
        self.ejection.reset();
        self.connection.reset();
        self.transcript.clear();
        self.speaking = false;
        self.mode = config.mode;
        self.connection.save_session(session.clone());
        self.set_status(CallStatus::Connecting);
        info!("starting call (workflow: {:?})", session.workflow_id());

        let result = match self.slot.acquire() {
            Ok(provider) => provider.start(&session.target, &session.options).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(handle) => {
                info!("call {} accepted ({})", handle.id, handle.status);
                Ok(())
            }
            Err(e) => {
                let failure = classifier::classify_error(&e);
                warn!("failed to start call: {}", failure);
                if failure.is_retryable() {
                    self.on_failure(failure).await;
                    Ok(())
                } else {
                    self.abort(failure.clone()).await;
                    Err(failure.into())
                }
            }
        }
    }

    async fn resolve_identity(&mut self, mut options: StartOptions) -> Result<StartOptions, CallError> {
        let Some(identity) = self.collaborators.identity.as_ref() else {
            return Ok(options);
        };
        match identity.current_user().await {
            Ok(Some(user)) => {
                let variables = &mut options.variable_values;
                variables.entry("username".to_string()).or_insert(user.name);
                variables.entry("userid".to_string()).or_insert(user.id);
                Ok(options)
            }
            Ok(None) => Err(CallError::NotSignedIn),
            Err(e) => {
                warn!("failed to resolve the current user: {:#}", e);
                Err(CallError::NotSignedIn)
            }
        }
    }

    async fn end_call(&mut self) {
        if self.current_status() == CallStatus::Inactive {
            debug!("end_call with no call in progress");
            return;
        }
        info!("ending call");
        self.finish(Outcome::UserEnded).await;
    }

    async fn send(&mut self, message: ProviderMessage) -> Result<(), CallError> {
        if self.current_status() != CallStatus::Active {
            return Err(CallError::NotConnected);
        }
        let provider = self.slot.instance_mut().ok_or(CallError::NotConnected)?;
        provider
            .send(message)
            .await
            .map_err(|e| CallError::Provider(format!("{:#}", e)))
    }

    async fn set_muted(&mut self, muted: bool) -> Result<(), CallError> {
        let provider = self.slot.instance_mut().ok_or(CallError::NotConnected)?;
        provider
            .set_muted(muted)
            .await
            .map_err(|e| CallError::Provider(format!("{:#}", e)))
    }

    fn is_muted(&self) -> bool {
        self.slot.instance().is_some_and(|provider| provider.is_muted())
    }

    async fn on_provider_event(&mut self, event: ProviderEvent) {
        trace!("provider event: {}", event.name());
        self.connection.touch();
        match event {
            ProviderEvent::CallStart => {
                self.connection.mark_connected();
                self.monitor.start();
                if self.current_status() == CallStatus::Connecting {
                    self.set_status(CallStatus::Active);
                }
            }
            ProviderEvent::CallEnd { reason, message } => {
                let failure = classifier::classify_call_end(reason, message.as_deref());
                info!("call ended: {}", failure);
                self.on_failure(failure).await;
            }
            ProviderEvent::SpeechStart => self.set_speaking(true),
            ProviderEvent::SpeechEnd => self.set_speaking(false),
            ProviderEvent::Transcript(message) => {
                if let Some(line) = self.transcript.record(&message) {
                    self.emit(CallEvent::Transcript { line });
                }
            }
            ProviderEvent::Error { message, reason } => {
                let failure = classifier::classify(&message, reason);
                self.on_failure(failure).await;
            }
        }
    }

    async fn on_monitor_tick(&mut self, tick: MonitorTick) {
        match tick {
            MonitorTick::Liveness => {
                if let Some(failure) = self.monitor.check(&self.connection, Instant::now()) {
                    self.handle_connection_loss(failure).await;
                }
            }
            MonitorTick::KeepAlive => {
                if self.connection.is_connected() {
                    trace!("keep-alive");
                    self.connection.touch();
                }
            }
        }
    }

    /// Routes a classified failure to its recovery path.
    async fn on_failure(&mut self, failure: CallFailure) {
        if self.current_status() == CallStatus::Inactive {
            debug!("ignoring failure after the call ended: {}", failure);
            return;
        }
        match failure.category {
            ErrorCategory::GracefulEnd => self.finish(Outcome::Completed).await,
            ErrorCategory::Ejection => self.handle_ejection(failure).await,
            ErrorCategory::ConnectionLoss => self.handle_connection_loss(failure).await,
            ErrorCategory::Authorization | ErrorCategory::Permission => self.abort(failure).await,
            ErrorCategory::Unknown => {
                warn!("provider error: {}", failure);
                self.notify(Notice::for_failure(&failure));
            }
        }
    }

    async fn handle_ejection(&mut self, failure: CallFailure) {
        if !self.ejection.try_begin(&failure, Instant::now()) {
            debug!("ejection already handled, ignoring: {}", failure);
            return;
        }
        warn!("ejected from session: {}", failure);
        self.connection.mark_disconnected();
        self.monitor.stop();
        self.schedule.cancel();
        self.collaborators.callbacks.on_ejection(&failure);
        self.notify(Notice::for_failure(&failure));
        self.slot.teardown().await;
        self.schedule_retry(FailureKind::Ejection, failure).await;
    }

    async fn handle_connection_loss(&mut self, failure: CallFailure) {
        if self.schedule.is_pending() || self.ejection.phase() != EjectionPhase::Clear {
            debug!("recovery already in progress, ignoring: {}", failure);
            return;
        }
        warn!("connection lost: {}", failure);
        self.connection.mark_disconnected();
        self.monitor.stop();
        self.collaborators.callbacks.on_connection_lost(&failure);
        self.notify(Notice::for_failure(&failure));
        self.schedule_retry(FailureKind::ConnectionLoss, failure).await;
    }

    async fn schedule_retry(&mut self, kind: FailureKind, failure: CallFailure) {
        let policy = self.settings.policy(kind);
        match reconnect::plan_retry(&self.connection, kind, &policy) {
            RetryDecision::Schedule { attempt, delay } => {
                info!(
                    "{} reconnect attempt {}/{} in {}ms",
                    kind,
                    attempt,
                    policy.max_attempts,
                    delay.as_millis()
                );
                self.schedule.schedule(kind, attempt, delay);
                self.emit(CallEvent::Reconnecting {
                    kind,
                    attempt,
                    delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                });
            }
            RetryDecision::Exhausted => self.retries_exhausted(kind, failure).await,
        }
    }

    async fn retries_exhausted(&mut self, kind: FailureKind, failure: CallFailure) {
        error!(
            "giving up on {} recovery after {} attempts: {}",
            kind,
            self.connection.attempts(kind),
            failure
        );
        if kind == FailureKind::Ejection {
            self.ejection.mark_exhausted();
        }
        self.collaborators.callbacks.on_reconnect_failed(&failure);
        self.notify(Notice::exhausted(kind));
        self.finish(Outcome::Failed(failure)).await;
    }

    async fn on_reconnect_due(&mut self, kind: FailureKind) {
        let attempt = self.connection.record_attempt(kind);
        if kind == FailureKind::Ejection {
            self.ejection.retry_started();
        }
        let Some(session) = self.connection.saved_session().cloned() else {
            let failure = CallFailure::new(ErrorCategory::Unknown, "no saved session to restore");
            self.retries_exhausted(kind, failure).await;
            return;
        };
        let policy = self.settings.policy(kind);
        info!("{} reconnect attempt {}/{} running", kind, attempt, policy.max_attempts);
        self.set_status(CallStatus::Connecting);

        let result =
            reconnect::restart_session(&mut self.slot, &session, &policy, self.settings.settle_delay)
                .await;
        match result {
            Ok(handle) => self.reconnected(kind, handle),
            Err(e) => {
                let failure = classifier::classify_error(&e);
                warn!("reconnect attempt {} failed: {}", attempt, failure);
                if failure.category.needs_user_action() {
                    self.abort(failure).await;
                    return;
                }
                if kind == FailureKind::Ejection {
                    // Same ejection episode: claim it again without re-notifying.
                    self.ejection.try_begin(&failure, Instant::now());
                    self.slot.teardown().await;
                }
                self.schedule_retry(kind, failure).await;
            }
        }
    }

    fn reconnected(&mut self, kind: FailureKind, handle: CallHandle) {
        info!("reconnected after {} (call {})", kind, handle.id);
        self.connection.mark_connected();
        self.connection.reset_attempts(FailureKind::ConnectionLoss);
        self.monitor.start();
        self.collaborators.callbacks.on_reconnect_success();
        self.emit(CallEvent::Reconnected { kind });
        self.notify(Notice::info("Reconnected to the interview."));
        self.set_status(CallStatus::Active);
    }

    /// Ends the session without the post-call flow. Used for failures the user must fix.
    async fn abort(&mut self, failure: CallFailure) {
        error!("call aborted: {}", failure);
        self.schedule.cancel();
        self.monitor.stop();
        self.slot.teardown().await;
        self.connection.reset();
        self.set_speaking(false);
        self.notify(Notice::for_failure(&failure));
        self.set_status(CallStatus::Inactive);
    }

    async fn finish(&mut self, outcome: Outcome) {
        self.schedule.cancel();
        self.monitor.stop();
        self.slot.teardown().await;
        self.connection.mark_disconnected();
        self.set_speaking(false);
        self.set_status(CallStatus::Finished);

        let redirect = self.post_call(&outcome).await;
        info!("redirecting to {}", redirect.path());
        self.emit(CallEvent::Redirect { to: redirect });

        self.connection.reset();
        self.set_status(CallStatus::Inactive);
    }

    async fn post_call(&mut self, outcome: &Outcome) -> Redirect {
        match outcome {
            Outcome::Failed(failure) => {
                info!("call failed ({}), skipping feedback", failure);
                return Redirect::Home;
            }
            Outcome::UserEnded => debug!("call ended by the user"),
            Outcome::Completed => {}
        }
        let CallMode::Interview {
            interview_id,
            user_id,
        } = &self.mode
        else {
            return Redirect::Home;
        };
        if self.transcript.is_empty() {
            info!("no transcript recorded, skipping feedback");
            return Redirect::Home;
        }
        let Some(feedback) = self.collaborators.feedback.clone() else {
            warn!("no feedback service configured, skipping feedback");
            return Redirect::Home;
        };

        let request = FeedbackRequest {
            interview_id: interview_id.clone(),
            user_id: user_id.clone(),
            transcript: self.transcript.lines().to_vec(),
        };
        match feedback.create_feedback(request).await {
            Ok(id) => {
                info!("feedback {} saved for interview {}", id.0, interview_id);
                Redirect::Feedback {
                    interview_id: interview_id.clone(),
                    feedback_id: id.0,
                }
            }
            Err(e) => {
                error!("failed to save feedback: {:#}", e);
                self.notify(Notice::error(None, "Could not save interview feedback."));
                Redirect::Home
            }
        }
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        let idle = self.connection.idle_for(Instant::now());
        ConnectionSnapshot {
            status: self.current_status(),
            connected: self.connection.is_connected(),
            reconnect_attempts: self.connection.attempts(FailureKind::ConnectionLoss),
            max_reconnect_attempts: self.settings.connection_loss.max_attempts,
            ejection_reconnect_attempts: self.connection.attempts(FailureKind::Ejection),
            max_ejection_reconnect_attempts: self.settings.ejection.max_attempts,
            ejection: self.ejection.phase(),
            ejection_error: self.ejection.ejection_error().cloned(),
            pending_reconnect: self.schedule.pending_kind(),
            saved_session: self.connection.saved_session().cloned(),
            provider_active: self.slot.is_occupied(),
            monitoring: self.monitor.is_running(),
            muted: self.is_muted(),
            idle_ms: u64::try_from(idle.as_millis()).unwrap_or(u64::MAX),
            transcript_lines: self.transcript.len(),
        }
    }

    async fn dispose(&mut self) {
        self.schedule.cancel();
        self.monitor.stop();
        self.slot.teardown().await;
        self.connection.reset();
        self.ejection.reset();
        self.set_status(CallStatus::Inactive);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::NoopCallbacks;
    use crate::services::{FixedMicrophone, MockFeedbackService, MockIdentityProvider};
    use crate::simulated::{SimulatedControl, SimulatedFactory};

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_run_future_can_be_spawned() {
        let (status, _) = watch::channel(CallStatus::Inactive);
        let (events, _) = broadcast::channel(8);
        let collaborators = Collaborators {
            callbacks: Arc::new(NoopCallbacks),
            feedback: Some(Arc::new(MockFeedbackService::new())),
            identity: Some(Arc::new(MockIdentityProvider::new())),
            microphone: Arc::new(FixedMicrophone(MicrophonePermission::Granted)),
        };
        let supervisor = Supervisor::new(
            ResilienceSettings::default(),
            Arc::new(SimulatedFactory::new(SimulatedControl::new())),
            collaborators,
            status,
            events,
        );
        let (_commands, command_rx) = mpsc::channel(1);

        // Awaiting identity and feedback must not hold a shared borrow of the supervisor.
        let run = supervisor.run(command_rx);
        assert_send(&run);
    }
}
