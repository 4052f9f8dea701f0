use crate::client::stats::Stats;
use crate::types;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use voice_realtime_types::events::client::{
    AddMessageEvent, CallStartEvent, CallStopEvent, ControlEvent, SayEvent,
};
use voice_realtime_types::{CallTarget, ChatMessage, StartOptions};

pub mod config;
mod consts;
pub mod stats;
mod utils;

pub type ClientTx = tokio::sync::mpsc::Sender<types::ClientEvent>;
type ServerTx = tokio::sync::broadcast::Sender<types::ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<types::ServerEvent>;

/// The operations the interview runtime needs from a connected voice client.
///
/// `Client` is the real implementation; the trait exists so adapters can be
/// tested against a mock.
#[async_trait::async_trait]
pub trait VoiceClient: Send {
    async fn start_call(&mut self, target: CallTarget, options: StartOptions) -> Result<()>;
    async fn stop_call(&mut self) -> Result<()>;
    async fn add_message(&mut self, message: ChatMessage) -> Result<()>;
    async fn set_microphone_muted(&mut self, muted: bool) -> Result<()>;
    async fn say(&mut self, content: String, end_call_after_spoken: bool) -> Result<()>;
    async fn server_events(&mut self) -> Result<ServerRx>;
    fn close(&mut self);
}

// Holds the channel capacity, client/server transmitters, configuration,
// and stats guarded by a Mutex.
pub struct Client {
    capacity: usize,
    config: config::Config,
    c_tx: Option<ClientTx>,
    s_tx: Option<ServerTx>,
    stats: Arc<Mutex<Stats>>,
}

impl Client {
    fn new(capacity: usize, config: config::Config) -> Self {
        Self {
            capacity,
            config,
            c_tx: None,
            s_tx: None,
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    async fn connect(&mut self) -> Result<()> {
        if self.c_tx.is_some() {
            return Err(anyhow::anyhow!("already connected"));
        }

        let request = utils::build_request(&self.config)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel::<types::ClientEvent>(self.capacity);
        let (s_tx, _) = tokio::sync::broadcast::channel(self.capacity);

        self.c_tx = Some(c_tx);
        self.s_tx = Some(s_tx.clone());

        // Writer: serialise client events onto the socket until every sender is gone.
        tokio::spawn(async move {
            while let Some(event) = c_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize event: {}", e);
                    }
                }
            }
            if let Err(e) = write.close().await {
                tracing::debug!("failed to close socket: {}", e);
            }
        });

        let stats = self.stats.clone();
        // Reader: parse server frames and broadcast them.
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        let close_event = types::ServerEvent::Close {
                            reason: Some(format!("network error: {}", e)),
                        };
                        let _ = s_tx.send(close_event);
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<types::ServerEvent>(&text) {
                        Ok(event) => {
                            tracing::debug!("received message: {}", event.type_name());
                            if let Ok(mut stats_guard) = stats.lock() {
                                stats_guard.record(&event);
                            } else {
                                tracing::error!("failed to update stats");
                            }
                            if let Err(e) = s_tx.send(event) {
                                tracing::error!("failed to send event: {}", e);
                            }
                        }
                        Err(e) => {
                            tracing::error!("failed to deserialize event: {}, text=> {:?}", e, text);
                        }
                    },
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        let close_event = types::ServerEvent::Close {
                            reason: reason.map(|v| format!("{:?}", v)),
                        };
                        if let Err(e) = s_tx.send(close_event) {
                            tracing::error!("failed to send close event: {}", e);
                        }
                        break;
                    }
                    _ => {}
                }
            }
            drop(s_tx);
        });
        Ok(())
    }

    pub fn stats(&self) -> Result<Stats> {
        if let Ok(stats_guard) = self.stats.lock() {
            Ok(stats_guard.clone())
        } else {
            Err(anyhow::anyhow!("failed to get stats"))
        }
    }

    async fn send_client_event(&mut self, event: types::ClientEvent) -> Result<()> {
        match self.c_tx {
            Some(ref tx) => {
                tx.send(event).await?;
                Ok(())
            }
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }
}

#[async_trait::async_trait]
impl VoiceClient for Client {
    async fn start_call(&mut self, target: CallTarget, options: StartOptions) -> Result<()> {
        let event = types::ClientEvent::CallStart(CallStartEvent::new(target, options));
        self.send_client_event(event).await
    }

    async fn stop_call(&mut self) -> Result<()> {
        let event = types::ClientEvent::CallStop(CallStopEvent::new());
        self.send_client_event(event).await
    }

    async fn add_message(&mut self, message: ChatMessage) -> Result<()> {
        let event = types::ClientEvent::AddMessage(AddMessageEvent::new(message));
        self.send_client_event(event).await
    }

    async fn set_microphone_muted(&mut self, muted: bool) -> Result<()> {
        let event = types::ClientEvent::Control(ControlEvent::mute(muted));
        self.send_client_event(event).await
    }

    async fn say(&mut self, content: String, end_call_after_spoken: bool) -> Result<()> {
        let event = types::ClientEvent::Say(
            SayEvent::new(&content).with_end_call_after_spoken(end_call_after_spoken),
        );
        self.send_client_event(event).await
    }

    async fn server_events(&mut self) -> Result<ServerRx> {
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    // Dropping our sender lets the writer task drain and close the socket.
    fn close(&mut self) {
        self.c_tx.take();
        self.s_tx.take();
    }
}

pub async fn connect_with_config(capacity: usize, config: config::Config) -> Result<Client> {
    let mut client = Client::new(capacity, config);
    client.connect().await?;
    Ok(client)
}

pub async fn connect() -> Result<Client> {
    let config = config::Config::new();
    connect_with_config(1024, config).await
}
