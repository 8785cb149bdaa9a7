//! Router assembly and server lifecycle.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::routes;
use crate::state::AppState;

/// Build the signaling router. Permissive CORS: browser clients post
/// offers from arbitrary origins.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/offer", post(routes::offer))
        .route("/api/candidate", post(routes::candidate))
        .route("/", get(routes::connection_info))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until ctrl-c, then close every live session before
/// returning.
pub async fn start_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.host(), state.config.port());
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Voxlink listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.registry.shutdown_all().await;
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Shutdown signal received");
}
