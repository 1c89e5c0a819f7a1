//! Mapping of domain errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::AppError;

/// Error returned by request handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Domain failure from the coordinator or store.
    App(AppError),
    /// Malformed or incomplete request.
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl ApiError {
    /// Status code and stable error code for this error.
    #[must_use]
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::App(err) => match err {
                AppError::UnknownSession(_) => (StatusCode::NOT_FOUND, "unknown_session"),
                AppError::SessionClosed(_) => (StatusCode::CONFLICT, "session_closed"),
                AppError::InvalidTransition(_) => (StatusCode::CONFLICT, "invalid_transition"),
                AppError::MissingContext(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "missing_context")
                }
                AppError::GenerationUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "generation_unavailable")
                }
                AppError::Config(_) | AppError::Db(_) | AppError::Io(_) | AppError::Http(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let message = match self {
            Self::App(err) => err.to_string(),
            Self::BadRequest(msg) => msg,
        };
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(%message, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: code,
                message,
            }),
        )
            .into_response()
    }
}
