use crate::{ServerConfig, SignalingService, ws_handler};
use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

pub fn router(service: SignalingService) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(service)
}

pub async fn serve(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    serve_with_listener(listener, SignalingService::new(config.room)).await
}

pub async fn serve_with_listener(listener: TcpListener, service: SignalingService) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(
        "Signaling relay listening on ws://{}/ws (room cap: {:?})",
        addr,
        service.directory().policy().max_participants
    );
    axum::serve(listener, router(service))
        .await
        .context("Signaling server stopped")?;
    Ok(())
}
