//! An in-process voice provider driven by a [`SimulatedControl`] handle.
//!
//! Every instance created by a [`SimulatedFactory`] reports to the same control,
//! which can queue start failures, inject events into the live instance and
//! replay a timed script.

use crate::connection::SessionConfig;
use crate::provider::{ProviderEvent, ProviderFactory, ProviderMessage, SessionProvider};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use voice_realtime_types::{CallHandle, CallTarget, StartOptions};

const EVENT_CAPACITY: usize = 128;

#[derive(Default)]
struct ControlState {
    listener: Option<mpsc::Sender<ProviderEvent>>,
    instances_created: usize,
    starts: Vec<SessionConfig>,
    stops: usize,
    sent: Vec<ProviderMessage>,
    start_failures: VecDeque<String>,
    manual_call_start: bool,
}

#[derive(Clone, Default)]
pub struct SimulatedControl {
    state: Arc<Mutex<ControlState>>,
}

impl SimulatedControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The next `start` on any instance fails with this message.
    pub fn fail_next_start(&self, message: &str) {
        self.lock().start_failures.push_back(message.to_string());
    }

    /// Stop emitting `CallStart` automatically after a successful start.
    pub fn set_manual_call_start(&self, manual: bool) {
        self.lock().manual_call_start = manual;
    }

    /// Sends an event from the live instance. Returns false when nothing is listening.
    pub fn emit(&self, event: ProviderEvent) -> bool {
        let listener = self.lock().listener.clone();
        match listener {
            Some(listener) => listener.try_send(event).is_ok(),
            None => false,
        }
    }

    /// Emits each event after its delay, in order.
    pub async fn play(&self, script: Vec<(Duration, ProviderEvent)>) {
        for (delay, event) in script {
            tokio::time::sleep(delay).await;
            if !self.emit(event) {
                tracing::debug!("simulated event dropped, no live instance");
            }
        }
    }

    pub fn instances_created(&self) -> usize {
        self.lock().instances_created
    }

    pub fn starts(&self) -> Vec<SessionConfig> {
        self.lock().starts.clone()
    }

    pub fn stops(&self) -> usize {
        self.lock().stops
    }

    pub fn sent(&self) -> Vec<ProviderMessage> {
        self.lock().sent.clone()
    }

    pub fn has_listener(&self) -> bool {
        self.lock().listener.is_some()
    }
}

pub struct SimulatedFactory {
    control: SimulatedControl,
}

impl SimulatedFactory {
    pub fn new(control: SimulatedControl) -> Self {
        Self { control }
    }
}

impl ProviderFactory for SimulatedFactory {
    fn create(&self) -> Result<Box<dyn SessionProvider>> {
        let id = {
            let mut state = self.control.lock();
            state.instances_created += 1;
            state.instances_created
        };
        Ok(Box::new(SimulatedProvider {
            id,
            control: self.control.clone(),
            listener: None,
            active: false,
            muted: false,
            calls: 0,
        }))
    }
}

pub struct SimulatedProvider {
    id: usize,
    control: SimulatedControl,
    listener: Option<mpsc::Sender<ProviderEvent>>,
    active: bool,
    muted: bool,
    calls: usize,
}

#[async_trait]
impl SessionProvider for SimulatedProvider {
    async fn start(&mut self, target: &CallTarget, options: &StartOptions) -> Result<CallHandle> {
        let (failure, manual) = {
            let mut state = self.control.lock();
            state
                .starts
                .push(SessionConfig::new(target.clone(), options.clone()));
            (state.start_failures.pop_front(), state.manual_call_start)
        };
        if let Some(message) = failure {
            return Err(anyhow::anyhow!(message));
        }

        self.active = true;
        self.calls += 1;
        if !manual {
            if let Some(listener) = self.listener.as_ref() {
                let _ = listener.try_send(ProviderEvent::CallStart);
            }
        }
        let id = format!("sim-{}-{}", self.id, self.calls);
        Ok(CallHandle::new(&id, "queued"))
    }

    async fn stop(&mut self) -> Result<()> {
        self.control.lock().stops += 1;
        self.active = false;
        Ok(())
    }

    async fn send(&mut self, message: ProviderMessage) -> Result<()> {
        if !self.active {
            return Err(anyhow::anyhow!("no active call"));
        }
        self.control.lock().sent.push(message);
        Ok(())
    }

    async fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.muted = muted;
        Ok(())
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn subscribe(&mut self) -> mpsc::Receiver<ProviderEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        self.control.lock().listener = Some(tx.clone());
        self.listener = Some(tx);
        rx
    }

    fn remove_all_listeners(&mut self) {
        if let Some(listener) = self.listener.take() {
            let mut state = self.control.lock();
            let is_current = state
                .listener
                .as_ref()
                .is_some_and(|current| current.same_channel(&listener));
            if is_current {
                state.listener = None;
            }
        }
    }
}
