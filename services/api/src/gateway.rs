//! WebSocket gateway between a browser UI and one call orchestrator per socket.
//!
//! Clients send [`UiCommand`] JSON frames and receive every [`CallEvent`](interview_core::CallEvent) of their
//! call, plus [`GatewayMessage`] replies for commands that return data or fail.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use interview_core::services::{MicrophoneGate, MicrophonePermission};
use interview_core::simulated::{SimulatedControl, SimulatedFactory};
use interview_core::types::{CallTarget, StartOptions};
use interview_core::{
    CallConfig, CallError, CallMode, CallOrchestrator, ConnectionSnapshot, LoggingCallbacks,
    ProviderFactory, ProviderMessage, ResilienceSettings,
};
use interview_service::demo::demo_script;
use interview_service::feedback_client::FeedbackClient;
use interview_service::realtime_adapter::{RealtimeFactory, WsConnector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, info, warn};

use crate::config::Config;

/// Commands accepted from the UI.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiCommand {
    StartCall {
        target: CallTarget,
        #[serde(default)]
        variable_values: BTreeMap<String, String>,
        #[serde(default)]
        mode: CallMode,
        /// Browser microphone permission at the time of the click.
        #[serde(default)]
        microphone: Option<MicrophonePermission>,
    },
    EndCall,
    SetMuted { muted: bool },
    Say {
        content: String,
        #[serde(default)]
        end_call_after_spoken: bool,
    },
    Send { message: ProviderMessage },
    ClearEjection,
    Snapshot,
}

/// Frames the gateway sends besides forwarded call events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    Snapshot { snapshot: ConnectionSnapshot },
    Muted { muted: bool },
    Error { message: String },
}

#[derive(Clone)]
enum Backend {
    Simulated,
    Realtime(voice_realtime::Config),
}

/// Shared state handed to every socket.
#[derive(Clone)]
pub struct AppState {
    backend: Backend,
    settings: ResilienceSettings,
    feedback: Option<Arc<FeedbackClient>>,
}

impl AppState {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let session = &config.session;
        let backend = if session.simulate {
            Backend::Simulated
        } else {
            Backend::Realtime(session.voice_config()?)
        };
        let feedback = session
            .feedback_api_url
            .as_deref()
            .map(|url| Arc::new(FeedbackClient::new(url, session.feedback_api_token.clone())));
        Ok(Self {
            backend,
            settings: session.resilience.clone(),
            feedback,
        })
    }

    #[cfg(test)]
    fn simulated(settings: ResilienceSettings) -> Self {
        Self {
            backend: Backend::Simulated,
            settings,
            feedback: None,
        }
    }

    /// Builds the call session for one client.
    fn session(&self) -> Session {
        let microphone = Arc::new(UiMicrophone::default());
        let (factory, control): (Arc<dyn ProviderFactory>, _) = match &self.backend {
            Backend::Simulated => {
                let control = SimulatedControl::new();
                (Arc::new(SimulatedFactory::new(control.clone())), Some(control))
            }
            Backend::Realtime(voice) => (
                Arc::new(RealtimeFactory::new(WsConnector::new(voice.clone()))),
                None,
            ),
        };
        let mut builder = CallOrchestrator::builder(factory)
            .with_settings(self.settings.clone())
            .with_callbacks(Arc::new(LoggingCallbacks))
            .with_microphone(microphone.clone());
        if let Some(feedback) = &self.feedback {
            builder = builder
                .with_feedback(feedback.clone())
                .with_identity(feedback.clone());
        }
        Session {
            orchestrator: builder.build(),
            microphone,
            control,
        }
    }
}

/// Microphone permission as last reported by the browser.
struct UiMicrophone(Mutex<MicrophonePermission>);

impl Default for UiMicrophone {
    fn default() -> Self {
        Self(Mutex::new(MicrophonePermission::Prompt))
    }
}

impl UiMicrophone {
    fn set(&self, permission: MicrophonePermission) {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = permission;
    }
}

impl MicrophoneGate for UiMicrophone {
    fn permission(&self) -> MicrophonePermission {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Everything one socket drives.
struct Session {
    orchestrator: CallOrchestrator,
    microphone: Arc<UiMicrophone>,
    /// Present when the client talks to the simulated provider.
    control: Option<SimulatedControl>,
}

impl Session {
    /// Runs one UI command. Returns the frame to send back, if any.
    async fn dispatch(&self, command: UiCommand) -> Option<GatewayMessage> {
        debug!("ui command: {:?}", command);
        let orchestrator = &self.orchestrator;
        let result = match command {
            UiCommand::StartCall {
                target,
                variable_values,
                mode,
                microphone,
            } => {
                if let Some(permission) = microphone {
                    self.microphone.set(permission);
                }
                let call = CallConfig::new(target)
                    .with_options(StartOptions { variable_values })
                    .with_mode(mode);
                let result = orchestrator.start_call(call).await;
                if result.is_ok() {
                    self.play_demo();
                }
                result.map(|_| None)
            }
            UiCommand::EndCall => orchestrator.end_call().await.map(|_| None),
            UiCommand::SetMuted { muted } => orchestrator
                .set_muted(muted)
                .await
                .map(|_| Some(GatewayMessage::Muted { muted })),
            UiCommand::Say {
                content,
                end_call_after_spoken,
            } => orchestrator
                .send(ProviderMessage::Say {
                    content,
                    end_call_after_spoken,
                })
                .await
                .map(|_| None),
            UiCommand::Send { message } => orchestrator.send(message).await.map(|_| None),
            UiCommand::ClearEjection => orchestrator.clear_ejection().await.map(|_| None),
            UiCommand::Snapshot => orchestrator
                .snapshot()
                .await
                .map(|snapshot| Some(GatewayMessage::Snapshot { snapshot })),
        };
        result.unwrap_or_else(|e: CallError| {
            Some(GatewayMessage::Error {
                message: e.to_string(),
            })
        })
    }

    fn play_demo(&self) {
        if let Some(control) = self.control.clone() {
            tokio::spawn(async move { control.play(demo_script()).await });
        }
    }
}

/// Handles WebSocket upgrade requests.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("WebSocket connection established");
    let session = state.session();
    let (mut sink, mut stream) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(32);

    // Single writer: call events and command replies share the socket sink.
    let mut events = session.orchestrator.subscribe();
    let writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => encode(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("client lagged behind by {} call events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => Some(reply),
                    None => break,
                },
            };
            let Some(frame) = frame else { continue };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                debug!("client went away while sending");
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                info!("WebSocket error: {}", e);
                break;
            }
        };

        let reply = match serde_json::from_str::<UiCommand>(text.as_str()) {
            Ok(command) => session.dispatch(command).await,
            Err(e) => Some(GatewayMessage::Error {
                message: format!("unrecognised command: {}", e),
            }),
        };

        if let Some(frame) = reply.as_ref().and_then(encode) {
            if reply_tx.send(frame).await.is_err() {
                break;
            }
        }
    }

    if let Err(e) = session.orchestrator.shutdown().await {
        debug!("orchestrator already stopped: {}", e);
    }
    drop(reply_tx);
    writer.abort();
    info!("WebSocket connection closed");
}

fn encode<T: Serialize>(frame: &T) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!("failed to encode frame: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::CallStatus;
    use std::time::Duration;

    fn test_session() -> Session {
        AppState::simulated(ResilienceSettings::default().with_keep_alive(None)).session()
    }

    fn start(workflow: &str, microphone: Option<MicrophonePermission>) -> UiCommand {
        UiCommand::StartCall {
            target: CallTarget::workflow(workflow),
            variable_values: BTreeMap::new(),
            mode: CallMode::Generate,
            microphone,
        }
    }

    #[test]
    fn test_parse_start_call() {
        let command: UiCommand = serde_json::from_str(
            r#"{
                "type": "start_call",
                "target": {"workflow": "wf-1"},
                "variable_values": {"username": "Ana"},
                "mode": {"type": "interview", "interview_id": "iv-1", "user_id": "u-1"},
                "microphone": "granted"
            }"#,
        )
        .unwrap();
        let UiCommand::StartCall {
            target,
            variable_values,
            mode,
            microphone,
        } = command
        else {
            panic!("expected start_call");
        };
        assert_eq!(target, CallTarget::workflow("wf-1"));
        assert_eq!(variable_values.get("username").map(String::as_str), Some("Ana"));
        assert!(matches!(mode, CallMode::Interview { .. }));
        assert_eq!(microphone, Some(MicrophonePermission::Granted));
    }

    #[test]
    fn test_parse_simple_commands() {
        let command: UiCommand =
            serde_json::from_str(r#"{"type": "set_muted", "muted": true}"#).unwrap();
        assert_eq!(command, UiCommand::SetMuted { muted: true });

        let command: UiCommand =
            serde_json::from_str(r#"{"type": "say", "content": "Bye"}"#).unwrap();
        assert_eq!(
            command,
            UiCommand::Say {
                content: "Bye".to_string(),
                end_call_after_spoken: false
            }
        );

        let command: UiCommand =
            serde_json::from_str(r#"{"type": "start_call", "target": {"workflow": "wf"}}"#)
                .unwrap();
        assert_eq!(command, start("wf", None));

        assert!(serde_json::from_str::<UiCommand>(r#"{"type": "dance"}"#).is_err());
    }

    #[test]
    fn test_error_frame_shape() {
        let frame = encode(&GatewayMessage::Error {
            message: "no call".to_string(),
        })
        .unwrap();
        assert_eq!(frame, r#"{"type":"error","message":"no call"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_start_mute_and_snapshot() {
        let session = test_session();
        assert!(session.control.is_some());

        assert_eq!(session.dispatch(start("wf-1", None)).await, None);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(session.orchestrator.status(), CallStatus::Active);

        let reply = session.dispatch(UiCommand::SetMuted { muted: true }).await;
        assert_eq!(reply, Some(GatewayMessage::Muted { muted: true }));

        let Some(GatewayMessage::Snapshot { snapshot }) =
            session.dispatch(UiCommand::Snapshot).await
        else {
            panic!("expected a snapshot");
        };
        assert!(snapshot.connected);
        assert!(snapshot.muted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_microphone_from_ui_blocks_start() {
        let session = test_session();

        let reply = session
            .dispatch(start("wf-1", Some(MicrophonePermission::Denied)))
            .await;
        assert!(matches!(reply, Some(GatewayMessage::Error { .. })));
        assert_eq!(session.orchestrator.status(), CallStatus::Inactive);

        let reply = session
            .dispatch(start("wf-1", Some(MicrophonePermission::Granted)))
            .await;
        assert_eq!(reply, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_reports_errors() {
        let session = test_session();

        let reply = session
            .dispatch(UiCommand::Say {
                content: "hello".to_string(),
                end_call_after_spoken: false,
            })
            .await;
        assert!(matches!(reply, Some(GatewayMessage::Error { .. })));

        let reply = session.dispatch(start("  ", None)).await;
        assert!(matches!(reply, Some(GatewayMessage::Error { .. })));
    }
}
