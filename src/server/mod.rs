mod router;
mod state;
mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::orchestrator::Orchestrator;

pub use router::build_router;
pub use state::{ServeHealth, ServeState};

/// Bind and serve until the process is stopped.
pub async fn serve(config: &Config, orchestrator: Arc<Orchestrator>) -> Result<()> {
    let health = Arc::new(ServeHealth::new());
    health.mark_live();
    health.mark_ready();

    let state = ServeState {
        orchestrator,
        health,
        artifacts_root: config.artifacts_dir.clone(),
    };
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "webpilot listening");
    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
