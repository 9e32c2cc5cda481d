/// HTTP server setup using `axum`.
///
/// Provides `ApiServer`, which binds the query route to a shared pipeline
/// and serves until Ctrl-C.
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::post;
use tracing::info;

use super::handlers;
use crate::pipeline::RagPipeline;

/// Build the router; split out so tests and embedders can mount it elsewhere.
pub fn router(pipeline: Arc<RagPipeline>) -> Router {
    Router::new()
        .route("/query", post(handlers::query))
        .with_state(pipeline)
}

pub struct ApiServer {
    pipeline: Arc<RagPipeline>,
    bind: String,
}

impl ApiServer {
    pub fn new(pipeline: Arc<RagPipeline>, bind: impl Into<String>) -> Self {
        Self {
            pipeline,
            bind: bind.into(),
        }
    }

    /// Serve until Ctrl-C is received.
    pub async fn start(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.bind)
            .await
            .with_context(|| format!("failed to bind {}", self.bind))?;
        info!("Listening on http://{}", listener.local_addr()?);

        axum::serve(listener, router(self.pipeline))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server encountered an error")?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
