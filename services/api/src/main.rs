mod config;
mod gateway;

use anyhow::Context;
use axum::{Router, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

use crate::config::Config;
use crate::gateway::{AppState, ws_handler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config = Config::from_env().context("Failed to load application configuration")?;

    // 2. Initialize logging.
    tracing_subscriber::fmt()
        .with_max_level(config.session.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let state = AppState::from_config(&config).context("Failed to prepare the call gateway")?;
    if config.session.simulate {
        info!("Serving calls from the simulated voice provider");
    }

    // The UI is served from a different origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 3. Build the router.
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state);

    // 4. Serve.
    info!("Starting call gateway, listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
