use anyhow::{Context, Result};
use clap::Parser;
use interview_core::services::{StaticIdentity, UserIdentity};
use interview_core::simulated::{SimulatedControl, SimulatedFactory};
use interview_core::types::{CallTarget, StartOptions};
use interview_core::{
    CallConfig, CallEvent, CallMode, CallOrchestrator, LoggingCallbacks, ProviderFactory, Severity,
};
use interview_service::config::Config;
use interview_service::demo::demo_script;
use interview_service::feedback_client::FeedbackClient;
use interview_service::realtime_adapter::{RealtimeFactory, WsConnector};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Run a voice interview from the terminal")]
struct Cli {
    /// Workflow configured on the voice provider
    #[arg(long)]
    workflow: String,
    /// Name passed to the workflow as `username`
    #[arg(long)]
    username: Option<String>,
    /// Id passed to the workflow as `userid`
    #[arg(long)]
    user_id: Option<String>,
    /// Grade the call as this interview and submit feedback when it ends
    #[arg(long)]
    interview_id: Option<String>,
    /// Use the in-process simulated provider instead of the network
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // The simulated provider needs no key, so let the flag satisfy validation.
    dotenvy::dotenv().ok();
    let config = Config::from_lookup(|key| match key {
        "SIMULATE_PROVIDER" if args.simulate => Some("true".to_string()),
        _ => std::env::var(key).ok(),
    })
    .context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!("Configuration loaded successfully. Starting interviewer...");

    let simulation = config.simulate.then(SimulatedControl::new);
    let factory: Arc<dyn ProviderFactory> = match &simulation {
        Some(control) => {
            tracing::info!("Using the simulated voice provider");
            Arc::new(SimulatedFactory::new(control.clone()))
        }
        None => {
            let voice = config
                .voice_config()
                .context("Voice provider is not configured")?;
            Arc::new(RealtimeFactory::new(WsConnector::new(voice)))
        }
    };

    let mut builder = CallOrchestrator::builder(factory)
        .with_settings(config.resilience.clone())
        .with_callbacks(Arc::new(LoggingCallbacks));

    let feedback = config
        .feedback_api_url
        .as_deref()
        .map(|url| Arc::new(FeedbackClient::new(url, config.feedback_api_token.clone())));
    if let Some(feedback) = &feedback {
        builder = builder.with_feedback(feedback.clone());
    }
    match (&args.username, &feedback) {
        (Some(username), _) => {
            builder = builder.with_identity(Arc::new(StaticIdentity(UserIdentity {
                id: args.user_id.clone().unwrap_or_else(|| username.clone()),
                name: username.clone(),
            })));
        }
        (None, Some(feedback)) => builder = builder.with_identity(feedback.clone()),
        (None, None) => tracing::warn!("No user identity available, starting anonymously"),
    }

    let mode = match (&args.interview_id, &args.user_id) {
        (Some(interview_id), Some(user_id)) => CallMode::Interview {
            interview_id: interview_id.clone(),
            user_id: user_id.clone(),
        },
        (Some(_), None) => {
            tracing::warn!("--interview-id needs --user-id to submit feedback, ignoring it");
            CallMode::Generate
        }
        _ => CallMode::Generate,
    };

    let orchestrator = builder.build();
    let mut events = orchestrator.subscribe();

    let call = CallConfig::new(CallTarget::workflow(&args.workflow))
        .with_options(StartOptions::new())
        .with_mode(mode);
    orchestrator
        .start_call(call)
        .await
        .context("Failed to start the call")?;

    if let Some(control) = simulation {
        tokio::spawn(async move { control.play(demo_script()).await });
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(CallEvent::Redirect { to }) => {
                    println!("Call over, continue at {}", to.path());
                    break;
                }
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {} call events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, ending the call...");
                orchestrator.end_call().await.context("Failed to end the call")?;
            }
        }
    }

    orchestrator.shutdown().await.ok();
    tracing::info!("Shutting down...");
    Ok(())
}

fn print_event(event: &CallEvent) {
    match event {
        CallEvent::Transcript { line } => println!("{:?}: {}", line.role, line.content),
        CallEvent::Notice(notice) => match notice.severity {
            Severity::Info => tracing::info!("{}", notice.message),
            Severity::Warning => tracing::warn!("{}", notice.message),
            Severity::Error => tracing::error!("{}", notice.message),
        },
        CallEvent::Reconnecting {
            kind,
            attempt,
            delay_ms,
        } => tracing::info!("Reconnecting after {} (attempt {}) in {}ms", kind, attempt, delay_ms),
        CallEvent::Status { status } => tracing::info!("Call status: {}", status),
        CallEvent::Speaking { speaking } => tracing::debug!("Assistant speaking: {}", speaking),
        CallEvent::Reconnected { kind } => tracing::info!("Recovered from {}", kind),
        CallEvent::Redirect { to } => tracing::info!("Redirect to {}", to.path()),
    }
}
