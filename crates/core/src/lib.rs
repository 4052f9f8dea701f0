pub mod callbacks;
pub mod classifier;
pub mod connection;
pub mod ejection;
pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod provider;
pub mod reconnect;
pub mod services;
pub mod settings;
pub mod simulated;
pub mod transcript;

mod supervisor;

pub use callbacks::{ConnectionCallbacks, LoggingCallbacks, NoopCallbacks};
pub use connection::SessionConfig;
pub use error::{CallError, CallFailure, ErrorCategory};
pub use orchestrator::{
    CallConfig, CallEvent, CallMode, CallOrchestrator, CallStatus, ConnectionSnapshot, Notice,
    OrchestratorBuilder, Redirect, Severity,
};
pub use provider::{ProviderEvent, ProviderFactory, ProviderMessage, SessionProvider};
pub use reconnect::FailureKind;
pub use settings::{Backoff, ResilienceSettings, RetryPolicy};

pub use voice_realtime_types as types;
