mod client;

pub use voice_realtime_types as types;
pub use client::config::{Config, ConfigBuilder};
pub use client::stats::Stats;
pub use client::{Client, ServerRx, VoiceClient, connect, connect_with_config};
