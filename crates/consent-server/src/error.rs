//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every response body for a failed request has the same shape:
//!
//! ```json
//! {"error": "not_found", "message": "consent not found: …"}
//! ```
//!
//! `error` is a stable code callers can branch on; `message` is for humans.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use consent_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] CoreError),

  /// The request could not be parsed at all.
  #[error("bad request: {0}")]
  BadRequest(String),
}

impl ApiError {
  pub fn status_and_code(&self) -> (StatusCode, &'static str) {
    match self {
      ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation_error"),
      ApiError::Core(e) => match e {
        CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        CoreError::OwnerNotFound(_) => (StatusCode::BAD_REQUEST, "unknown_owner"),
        CoreError::DuplicatePending { .. } => (StatusCode::CONFLICT, "duplicate_pending"),
        CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        CoreError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
        CoreError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
        CoreError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
        CoreError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        CoreError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
      },
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { ApiError::BadRequest(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self { ApiError::BadRequest(rejection.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, code) = self.status_and_code();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    } else {
      tracing::debug!(error = %self, code, "request rejected");
    }
    (status, Json(json!({ "error": code, "message": self.to_string() }))).into_response()
  }
}
