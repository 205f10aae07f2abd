//! HTTP API for DevBot.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /api/v1/chat` - Ask a question
//! - `POST /api/v1/documents` - Upload a text document into the session
//! - `DELETE /api/v1/sessions/{id}` - Drop the session's uploaded documents
//! - `GET /api/v1/history/{user}` - Recent exchanges for a user
//!
//! When an API key is configured every route except `/health` requires
//! `Authorization: Bearer <key>`.
//!
//! # Architecture
//!
//! ```text
//! Client (browser / curl)
//!    │
//!    ▼
//! ┌─────────────────┐
//! │   API (Axum)    │ ◄── This crate
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐      ┌─────────────────┐
//! │   ChatService   │ ───► │   LLM server    │
//! └────────┬────────┘      └─────────────────┘
//!          ▼
//! ┌─────────────────┐
//! │ Semantic store  │
//! └─────────────────┘
//! ```

pub mod auth;
pub mod routes;
pub mod sessions;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use auth::{ApiKey, API_KEY_ENV};
pub use sessions::SessionRegistry;
pub use state::AppState;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(parsed)
}

/// Create the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.cors_origins);
    let api_key = state.api_key.clone();

    let router = Router::new()
        .route("/health", get(routes::health))
        .route("/api/v1/chat", post(routes::chat))
        .route("/api/v1/documents", post(routes::upload_document))
        .route("/api/v1/sessions/{id}", delete(routes::reset_session))
        .route("/api/v1/history/{user}", get(routes::history))
        .with_state(state);

    let router = match api_key {
        Some(key) => router.layer(middleware::from_fn_with_state(key, auth::require_api_key)),
        None => router,
    };

    router.layer(TraceLayer::new_for_http()).layer(cors)
}

/// Serve until Ctrl-C or SIGTERM.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    if state.api_key.is_none() {
        warn!("No API key configured; all routes are open");
    }
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Starting DevBot API server");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("DevBot API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
