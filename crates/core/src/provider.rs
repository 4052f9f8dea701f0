use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use tokio::sync::mpsc;
use voice_realtime_types::{
    CallHandle, CallTarget, ChatMessage, EndReason, StartOptions, TranscriptMessage,
};

/// Provider-neutral events a voice session emits.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    CallStart,
    CallEnd {
        reason: Option<EndReason>,
        message: Option<String>,
    },
    SpeechStart,
    SpeechEnd,
    Transcript(TranscriptMessage),
    Error {
        message: String,
        reason: Option<EndReason>,
    },
}

impl ProviderEvent {
    pub fn error(message: &str) -> Self {
        ProviderEvent::Error {
            message: message.to_string(),
            reason: None,
        }
    }

    pub fn call_end(reason: Option<EndReason>) -> Self {
        ProviderEvent::CallEnd {
            reason,
            message: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderEvent::CallStart => "call-start",
            ProviderEvent::CallEnd { .. } => "call-end",
            ProviderEvent::SpeechStart => "speech-start",
            ProviderEvent::SpeechEnd => "speech-end",
            ProviderEvent::Transcript(_) => "transcript",
            ProviderEvent::Error { .. } => "error",
        }
    }
}

/// Messages that can be pushed into a live call.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderMessage {
    AddMessage { message: ChatMessage },
    Say {
        content: String,
        #[serde(default)]
        end_call_after_spoken: bool,
    },
}

/// One instance of a voice session client.
///
/// Instances are never shared across ejection recoveries: a replacement is
/// requested from the [`ProviderFactory`] instead.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionProvider: Send {
    async fn start(&mut self, target: &CallTarget, options: &StartOptions) -> Result<CallHandle>;

    async fn stop(&mut self) -> Result<()>;

    async fn send(&mut self, message: ProviderMessage) -> Result<()>;

    async fn set_muted(&mut self, muted: bool) -> Result<()>;

    fn is_muted(&self) -> bool;

    /// Registers the single event listener for this instance, replacing any earlier one.
    fn subscribe(&mut self) -> mpsc::Receiver<ProviderEvent>;

    fn remove_all_listeners(&mut self);
}

pub trait ProviderFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn SessionProvider>>;
}

/// Stops the instance and detaches its listeners. Failures are logged and swallowed.
pub async fn teardown(provider: &mut dyn SessionProvider) {
    if let Err(e) = provider.stop().await {
        tracing::warn!("failed to stop provider instance: {:#}", e);
    }
    provider.remove_all_listeners();
}

/// Owns the current provider instance and its event stream.
pub(crate) struct ProviderSlot {
    factory: Arc<dyn ProviderFactory>,
    instance: Option<Box<dyn SessionProvider>>,
    events: Option<mpsc::Receiver<ProviderEvent>>,
    created: u64,
}

impl ProviderSlot {
    pub(crate) fn new(factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            factory,
            instance: None,
            events: None,
            created: 0,
        }
    }

    /// Returns the live instance, creating and subscribing a new one if the slot is empty.
    pub(crate) fn acquire(&mut self) -> Result<&mut Box<dyn SessionProvider>> {
        if self.instance.is_none() {
            let mut provider = self.factory.create()?;
            self.events = Some(provider.subscribe());
            self.created += 1;
            tracing::debug!("created provider instance #{}", self.created);
            self.instance = Some(provider);
        }
        self.instance
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("provider instance unavailable"))
    }

    pub(crate) fn instance_mut(&mut self) -> Option<&mut Box<dyn SessionProvider>> {
        self.instance.as_mut()
    }

    pub(crate) fn instance(&self) -> Option<&dyn SessionProvider> {
        self.instance.as_deref()
    }

    pub(crate) fn is_occupied(&self) -> bool {
        self.instance.is_some()
    }

    /// Disposes the current instance. Returns whether there was one.
    pub(crate) async fn teardown(&mut self) -> bool {
        // Dropping the receiver first keeps late events from a dying instance out.
        self.events = None;
        match self.instance.take() {
            Some(mut provider) => {
                teardown(provider.as_mut()).await;
                true
            }
            None => false,
        }
    }

    /// Next event from the current instance. Pends forever when there is none.
    pub(crate) async fn next_event(&mut self) -> Option<ProviderEvent> {
        let Some(events) = self.events.as_mut() else {
            return std::future::pending().await;
        };
        let event = events.recv().await;
        if event.is_none() {
            self.events = None;
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SingleUseFactory(std::sync::Mutex<Option<MockSessionProvider>>);

    impl ProviderFactory for SingleUseFactory {
        fn create(&self) -> Result<Box<dyn SessionProvider>> {
            let mut guard = self.0.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
            match guard.take() {
                Some(mock) => Ok(Box::new(mock)),
                None => Err(anyhow::anyhow!("factory exhausted")),
            }
        }
    }

    #[tokio::test]
    async fn test_teardown_swallows_stop_errors() {
        let mut mock = MockSessionProvider::new();
        mock.expect_stop()
            .times(1)
            .returning(|| Err(anyhow::anyhow!("already stopped")));
        mock.expect_remove_all_listeners().times(1).return_const(());

        teardown(&mut mock).await;
    }

    #[tokio::test]
    async fn test_slot_creates_once_and_tears_down() {
        let mut mock = MockSessionProvider::new();
        let (_tx, rx) = mpsc::channel(4);
        mock.expect_subscribe().times(1).return_once(move || rx);
        mock.expect_stop().times(1).returning(|| Ok(()));
        mock.expect_remove_all_listeners().times(1).return_const(());

        let factory = Arc::new(SingleUseFactory(std::sync::Mutex::new(Some(mock))));
        let mut slot = ProviderSlot::new(factory);

        assert!(slot.acquire().is_ok());
        // A second acquire reuses the live instance instead of asking the factory again.
        assert!(slot.acquire().is_ok());
        assert!(slot.is_occupied());

        assert!(slot.teardown().await);
        assert!(!slot.is_occupied());
        assert!(!slot.teardown().await);
    }

    #[tokio::test]
    async fn test_slot_forwards_events() {
        let mut mock = MockSessionProvider::new();
        let (tx, rx) = mpsc::channel(4);
        mock.expect_subscribe().return_once(move || rx);

        let factory = Arc::new(SingleUseFactory(std::sync::Mutex::new(Some(mock))));
        let mut slot = ProviderSlot::new(factory);
        slot.acquire().unwrap();

        tx.send(ProviderEvent::SpeechStart).await.unwrap();
        drop(tx);
        assert_eq!(slot.next_event().await, Some(ProviderEvent::SpeechStart));
        assert_eq!(slot.next_event().await, None);
    }
}
