//! OpenRaceReplay Server
//!
//! Serves built sessions as static JSON and streams them live over WebSocket

use anyhow::Result;
use orr_server::{api, config::ServerConfig, state};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting OpenRaceReplay Server");

    let config = ServerConfig::from_env()?;
    let addr = config.bind;
    info!(
        "Serving sessions from {} (frame step {} ms, tick {:?})",
        config.data_root.display(),
        config.frame_step_ms,
        config.tick
    );

    let state = state::AppState::new(config);
    let app = api::create_router(state.clone());

    info!("Server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
