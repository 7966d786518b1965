// HTTP API - photoshoot session endpoints and generated file serving

mod error;
mod routes;
mod schemas;
mod state;

pub use error::ApiError;
pub use schemas::{CancelResponse, ErrorBody, GenerateResponse, RegenerateRequest, RunRequest};
pub use state::AppState;

use crate::config::StudioConfig;
use crate::photoshoot::{GenerationService, PhotoshootOrchestrator};
use anyhow::Context;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use routes::api_routes;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Build the application router
pub fn router(state: Arc<AppState>, config: &StudioConfig) -> Router {
    Router::new()
        .merge(api_routes(&config.storage.public_prefix))
        .layer(DefaultBodyLimit::max(config.server.max_upload_bytes))
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn serve(config: StudioConfig, service: Arc<dyn GenerationService>) -> anyhow::Result<()> {
    let orchestrator = PhotoshootOrchestrator::new(service.clone());
    let state = Arc::new(AppState::new(
        orchestrator,
        service,
        config.storage.output_dir.clone(),
        config.default_poses,
    ));

    let app = router(state, &config);
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Starting photoshoot server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await
        .context("Server failed")?;

    Ok(())
}
