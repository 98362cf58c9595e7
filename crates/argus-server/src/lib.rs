//! Argus remediation server.
//!
//! Exposes `POST /remediate`, which accepts one finding and executes the
//! remediation actions the rule set prescribes, and `GET /healthz`.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

pub use config::{AppConfig, ServerConfig, load_config};
pub use error::ServerError;
pub use routes::create_router;
pub use state::AppState;

/// Build the application state and serve until shutdown.
pub async fn serve(cfg: AppConfig) -> anyhow::Result<()> {
    let state = Arc::new(AppState::init(&cfg)?);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind).await?;
    tracing::info!("argus-server listening on {}", cfg.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
