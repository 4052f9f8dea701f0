use anyhow::{Context, Result};
use async_trait::async_trait;
use interview_core::types::events::ServerEvent;
use interview_core::types::{CallHandle, CallTarget, ConversationMessage, EndReason, StartOptions};
use interview_core::{ProviderEvent, ProviderFactory, ProviderMessage, SessionProvider};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use voice_realtime::{ServerRx, VoiceClient};

const EVENT_CAPACITY: usize = 128;

/// Opens a connected [`VoiceClient`]. Split out so sessions can be tested against a mock client.
#[async_trait]
pub trait Connect: Send + Sync {
    type Client: VoiceClient + 'static;

    async fn connect(&self) -> Result<Self::Client>;
}

pub struct WsConnector {
    config: voice_realtime::Config,
    capacity: usize,
}

impl WsConnector {
    pub fn new(config: voice_realtime::Config) -> Self {
        Self {
            config,
            capacity: 1024,
        }
    }
}

#[async_trait]
impl Connect for WsConnector {
    type Client = voice_realtime::Client;

    async fn connect(&self) -> Result<Self::Client> {
        voice_realtime::connect_with_config(self.capacity, self.config.clone())
            .await
            .context("Failed to connect to the voice provider")
    }
}

/// Builds one [`RealtimeSession`] per provider instance.
pub struct RealtimeFactory<K: Connect> {
    connector: Arc<K>,
}

impl<K: Connect> RealtimeFactory<K> {
    pub fn new(connector: K) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }
}

impl<K: Connect + 'static> ProviderFactory for RealtimeFactory<K> {
    fn create(&self) -> Result<Box<dyn SessionProvider>> {
        Ok(Box::new(RealtimeSession::new(self.connector.clone())))
    }
}

/// A [`SessionProvider`] over the websocket voice client.
///
/// The socket is opened on `start`, so a restart after a lost connection always
/// gets a fresh one.
pub struct RealtimeSession<K: Connect> {
    connector: Arc<K>,
    client: Option<K::Client>,
    listener: Option<mpsc::Sender<ProviderEvent>>,
    forwarder: Option<JoinHandle<()>>,
    muted: bool,
    calls: u64,
}

impl<K: Connect> RealtimeSession<K> {
    pub fn new(connector: Arc<K>) -> Self {
        Self {
            connector,
            client: None,
            listener: None,
            forwarder: None,
            muted: false,
            calls: 0,
        }
    }

    fn stop_forwarding(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }

    fn close_client(&mut self) {
        self.stop_forwarding();
        if let Some(mut client) = self.client.take() {
            client.close();
        }
    }

    fn client_mut(&mut self) -> Result<&mut K::Client> {
        self.client
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("voice client is not connected"))
    }
}

#[async_trait]
impl<K: Connect> SessionProvider for RealtimeSession<K> {
    async fn start(&mut self, target: &CallTarget, options: &StartOptions) -> Result<CallHandle> {
        // A socket left over from a lost connection is not reused.
        self.close_client();

        let mut client = self.connector.connect().await?;
        let server_rx = client.server_events().await?;
        if let Some(listener) = self.listener.clone() {
            self.forwarder = Some(tokio::spawn(forward_events(server_rx, listener)));
        }
        client
            .start_call(target.clone(), options.clone())
            .await
            .context("Failed to send call start")?;
        if self.muted {
            client.set_microphone_muted(true).await?;
        }
        self.client = Some(client);

        self.calls += 1;
        Ok(CallHandle::new(&format!("call-{}", self.calls), "queued"))
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(client) = self.client.as_mut() else {
            return Ok(());
        };
        let result = client.stop_call().await;
        self.close_client();
        result.context("Failed to send call stop")
    }

    async fn send(&mut self, message: ProviderMessage) -> Result<()> {
        let client = self.client_mut()?;
        match message {
            ProviderMessage::AddMessage { message } => client.add_message(message).await,
            ProviderMessage::Say {
                content,
                end_call_after_spoken,
            } => client.say(content, end_call_after_spoken).await,
        }
    }

    async fn set_muted(&mut self, muted: bool) -> Result<()> {
        if let Some(client) = self.client.as_mut() {
            client.set_microphone_muted(muted).await?;
        }
        self.muted = muted;
        Ok(())
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn subscribe(&mut self) -> mpsc::Receiver<ProviderEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        self.listener = Some(tx);
        rx
    }

    fn remove_all_listeners(&mut self) {
        self.listener = None;
        self.stop_forwarding();
    }
}

async fn forward_events(mut server_rx: ServerRx, listener: mpsc::Sender<ProviderEvent>) {
    loop {
        match server_rx.recv().await {
            Ok(event) => {
                let Some(event) = translate(event) else {
                    continue;
                };
                if listener.send(event).await.is_err() {
                    tracing::debug!("provider event receiver dropped, stopping forwarder");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("dropped {} server events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Maps wire events onto provider events. Returns `None` for events the runtime ignores.
pub fn translate(event: ServerEvent) -> Option<ProviderEvent> {
    match event {
        ServerEvent::Close { reason } => Some(ProviderEvent::Error {
            message: format!(
                "connection closed: {}",
                reason.as_deref().unwrap_or("no reason given")
            ),
            reason: Some(EndReason::NetworkError),
        }),
        ServerEvent::CallStarted(_) => Some(ProviderEvent::CallStart),
        ServerEvent::CallEnded(ended) => Some(ProviderEvent::CallEnd {
            reason: ended.reason(),
            message: ended.message().map(str::to_string),
        }),
        ServerEvent::SpeechStarted => Some(ProviderEvent::SpeechStart),
        ServerEvent::SpeechEnded => Some(ProviderEvent::SpeechEnd),
        ServerEvent::Message(message) => match message.message() {
            ConversationMessage::Transcript(transcript) => {
                Some(ProviderEvent::Transcript(transcript.clone()))
            }
            ConversationMessage::Other => None,
        },
        ServerEvent::Error(error) => Some(ProviderEvent::Error {
            message: error.error().message().to_string(),
            reason: error.error().reason(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::types::events::server::{
        CallEndedEvent, CallStartedEvent, ErrorDetails, ErrorEvent, MessageEvent,
    };
    use interview_core::types::{ChatMessage, MessageRole, TranscriptMessage};
    use mockall::mock;
    use std::sync::Mutex;

    mock! {
        pub Voice {}
        #[async_trait]
        impl VoiceClient for Voice {
            async fn start_call(&mut self, target: CallTarget, options: StartOptions) -> Result<()>;
            async fn stop_call(&mut self) -> Result<()>;
            async fn add_message(&mut self, message: ChatMessage) -> Result<()>;
            async fn set_microphone_muted(&mut self, muted: bool) -> Result<()>;
            async fn say(&mut self, content: String, end_call_after_spoken: bool) -> Result<()>;
            async fn server_events(&mut self) -> Result<ServerRx>;
            fn close(&mut self);
        }
    }

    struct MockConnector {
        client: Mutex<Option<MockVoice>>,
    }

    impl MockConnector {
        fn new(client: MockVoice) -> Arc<Self> {
            Arc::new(Self {
                client: Mutex::new(Some(client)),
            })
        }
    }

    #[async_trait]
    impl Connect for MockConnector {
        type Client = MockVoice;

        async fn connect(&self) -> Result<MockVoice> {
            self.client
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow::anyhow!("network error: connection refused"))
        }
    }

    fn target() -> CallTarget {
        CallTarget::workflow("workflow-123")
    }

    #[test]
    fn test_close_becomes_network_error() {
        let event = translate(ServerEvent::Close {
            reason: Some("going away".to_string()),
        });
        assert_eq!(
            event,
            Some(ProviderEvent::Error {
                message: "connection closed: going away".to_string(),
                reason: Some(EndReason::NetworkError),
            })
        );
    }

    #[test]
    fn test_call_lifecycle_events() {
        assert_eq!(
            translate(ServerEvent::CallStarted(CallStartedEvent::new("call-1"))),
            Some(ProviderEvent::CallStart)
        );
        let ended = CallEndedEvent::new(Some(EndReason::Ejected)).with_message("Meeting has ended");
        assert_eq!(
            translate(ServerEvent::CallEnded(ended)),
            Some(ProviderEvent::CallEnd {
                reason: Some(EndReason::Ejected),
                message: Some("Meeting has ended".to_string()),
            })
        );
        let error = ErrorEvent::new(ErrorDetails::new("Domain not allowed"));
        assert_eq!(
            translate(ServerEvent::Error(error)),
            Some(ProviderEvent::error("Domain not allowed"))
        );
    }

    #[test]
    fn test_transcripts_pass_and_other_messages_drop() {
        let transcript = TranscriptMessage::final_from(MessageRole::User, "Hi");
        let event = ServerEvent::Message(MessageEvent::new(ConversationMessage::Transcript(
            transcript.clone(),
        )));
        assert_eq!(translate(event), Some(ProviderEvent::Transcript(transcript)));

        let other = ServerEvent::Message(MessageEvent::new(ConversationMessage::Other));
        assert_eq!(translate(other), None);
    }

    #[tokio::test]
    async fn test_start_connects_and_forwards_events() {
        let (server_tx, server_rx) = broadcast::channel(16);
        let mut client = MockVoice::new();
        client.expect_server_events().return_once(move || Ok(server_rx));
        client
            .expect_start_call()
            .withf(|target, options| {
                target.workflow_id() == Some("workflow-123")
                    && options.variable("username") == Some("Ana")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        client.expect_close().return_const(());

        let mut session = RealtimeSession::new(MockConnector::new(client));
        let mut events = session.subscribe();
        let handle = session
            .start(&target(), &StartOptions::new().with_variable("username", "Ana"))
            .await
            .unwrap();
        assert_eq!(handle.id, "call-1");

        server_tx
            .send(ServerEvent::CallStarted(CallStartedEvent::new("call-1")))
            .unwrap();
        assert_eq!(events.recv().await, Some(ProviderEvent::CallStart));
    }

    #[tokio::test]
    async fn test_stop_sends_stop_and_closes() {
        let (_server_tx, server_rx) = broadcast::channel(16);
        let mut client = MockVoice::new();
        client.expect_server_events().return_once(move || Ok(server_rx));
        client.expect_start_call().returning(|_, _| Ok(()));
        client.expect_stop_call().times(1).returning(|| Ok(()));
        client.expect_close().times(1).return_const(());

        let mut session = RealtimeSession::new(MockConnector::new(client));
        session.start(&target(), &StartOptions::new()).await.unwrap();
        session.stop().await.unwrap();

        // Nothing left to stop.
        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let client = MockVoice::new();
        let mut session = RealtimeSession::new(MockConnector::new(client));
        let result = session
            .send(ProviderMessage::Say {
                content: "hello".to_string(),
                end_call_after_spoken: false,
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_say_is_forwarded() {
        let (_server_tx, server_rx) = broadcast::channel(16);
        let mut client = MockVoice::new();
        client.expect_server_events().return_once(move || Ok(server_rx));
        client.expect_start_call().returning(|_, _| Ok(()));
        client
            .expect_say()
            .withf(|content, end_call| content == "Thanks, that's all." && *end_call)
            .times(1)
            .returning(|_, _| Ok(()));
        client.expect_close().return_const(());

        let mut session = RealtimeSession::new(MockConnector::new(client));
        session.start(&target(), &StartOptions::new()).await.unwrap();
        session
            .send(ProviderMessage::Say {
                content: "Thanks, that's all.".to_string(),
                end_call_after_spoken: true,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_as_error() {
        let connector = Arc::new(MockConnector {
            client: Mutex::new(None),
        });
        let mut session = RealtimeSession::new(connector);
        let err = session
            .start(&target(), &StartOptions::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("network error"));
    }
}
