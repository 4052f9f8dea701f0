pub mod config;
pub mod demo;
pub mod feedback_client;
pub mod realtime_adapter;

pub use interview_core as core;
