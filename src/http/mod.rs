//! HTTP surface of the session coordinator.
//!
//! Routes:
//! - `GET /health`
//! - `POST /sessions`, `GET /sessions/{id}`, `PUT /sessions/{id}/context`
//! - `POST /sessions/{id}/start`, `POST /sessions/{id}/stop`
//! - `POST /sessions/{id}/violations`, `POST /sessions/{id}/turns`
//! - `GET /sessions/{id}/events` (SSE), `GET /sessions/{id}/report`
//! - `GET /owners/{owner_id}/sessions`

pub mod error;
pub mod events;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RiskConfig;
use crate::orchestrator::SessionCoordinator;
use crate::{AppError, Result};

/// Shared state handed to every handler.
pub struct AppState {
    /// Session coordinator.
    pub coordinator: Arc<SessionCoordinator>,
    /// Default weights for violation reports that omit one.
    pub risk: RiskConfig,
}

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/{id}", get(handlers::get_session))
        .route("/sessions/{id}/context", put(handlers::attach_context))
        .route("/sessions/{id}/start", post(handlers::start_session))
        .route("/sessions/{id}/violations", post(handlers::report_violation))
        .route("/sessions/{id}/turns", post(handlers::submit_turn))
        .route("/sessions/{id}/stop", post(handlers::request_stop))
        .route("/sessions/{id}/events", get(handlers::events))
        .route("/sessions/{id}/report", get(handlers::report))
        .route("/owners/{owner_id}/sessions", get(handlers::list_owner_sessions))
        .with_state(state)
}

/// Serve the API on `127.0.0.1:port` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Http` if the listener fails to bind or the server
/// stops with an error.
pub async fn serve(state: Arc<AppState>, port: u16, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Http(format!("failed to bind {bind}: {err}")))?;

    info!(%bind, "starting session API");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Http(format!("server error: {err}")))?;

    info!("session API shut down");
    Ok(())
}
