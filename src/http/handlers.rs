//! Request handlers for the session API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::events::{effect_stream, sse_response};
use super::AppState;
use crate::generation::report::generate_report;
use crate::models::report::InterviewReport;
use crate::models::session::{Session, SessionContext};
use crate::models::turn::Turn;
use crate::models::violation::ViolationKind;
use crate::orchestrator::{SessionView, StopOutcome, ViolationOutcome};
use crate::AppError;

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Body of `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok`.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Sessions with a running actor.
    pub live_sessions: usize,
}

/// Body of `POST /sessions`.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Owning account.
    pub owner_id: String,
    /// Position applied for.
    pub position: String,
    /// Extracted reference text.
    #[serde(default)]
    pub reference_text: String,
}

/// Body of `PUT /sessions/{id}/context`.
#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    /// Position applied for.
    pub position: String,
    /// Extracted reference text.
    #[serde(default)]
    pub reference_text: String,
}

/// Body of `POST /sessions/{id}/violations`.
#[derive(Debug, Deserialize)]
pub struct ViolationRequest {
    /// Violation category.
    pub kind: ViolationKind,
    /// Explicit weight; the configured weight for `kind` when absent.
    pub weight: Option<u32>,
}

/// Body of `POST /sessions/{id}/turns`.
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    /// Participant text.
    pub content: String,
}

pub(super) async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        live_sessions: state.coordinator.live_count(),
    })
}

pub(super) async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    if req.owner_id.trim().is_empty() || req.position.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "owner_id and position are required".into(),
        ));
    }
    let context = SessionContext {
        position: req.position,
        reference_text: req.reference_text,
    };
    let session = state
        .coordinator
        .create_session(req.owner_id, context)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub(super) async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Arc<SessionView>>> {
    Ok(Json(state.coordinator.view(&id).await?))
}

pub(super) async fn attach_context(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ContextRequest>,
) -> ApiResult<Json<Session>> {
    let context = SessionContext {
        position: req.position,
        reference_text: req.reference_text,
    };
    Ok(Json(state.coordinator.attach_context(&id, context).await?))
}

pub(super) async fn start_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Arc<SessionView>>> {
    Ok(Json(state.coordinator.start_session(&id).await?))
}

pub(super) async fn report_violation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ViolationRequest>,
) -> ApiResult<Json<ViolationOutcome>> {
    let weight = req
        .weight
        .or_else(|| state.risk.weight_for(&req.kind))
        .ok_or_else(|| {
            ApiError::BadRequest(format!("no weight configured for kind {}", req.kind))
        })?;
    let outcome = state
        .coordinator
        .report_violation(&id, req.kind, weight)
        .await?;
    Ok(Json(outcome))
}

pub(super) async fn submit_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<TurnRequest>,
) -> ApiResult<Json<Turn>> {
    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".into()));
    }
    Ok(Json(state.coordinator.submit_turn(&id, req.content).await?))
}

pub(super) async fn request_stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<StopOutcome>> {
    Ok(Json(state.coordinator.request_stop(&id).await?))
}

pub(super) async fn events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let receiver = state.coordinator.subscribe(&id).await?;
    let view = state.coordinator.view(&id).await?;
    let position = view
        .session
        .context
        .as_ref()
        .map(|context| context.position.as_str())
        .ok_or_else(|| AppError::MissingContext(format!("session {id} has no context")))?;
    Ok(sse_response(effect_stream(id.clone(), position, receiver)))
}

pub(super) async fn report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<InterviewReport>> {
    let view = state.coordinator.view(&id).await?;
    let report = generate_report(
        &view,
        state.coordinator.generator(),
        state.coordinator.settings().report_excerpt_chars,
    )
    .await?;
    Ok(Json(report))
}

pub(super) async fn list_owner_sessions(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
) -> ApiResult<Json<Vec<Session>>> {
    Ok(Json(state.coordinator.list_for_owner(&owner_id).await?))
}
