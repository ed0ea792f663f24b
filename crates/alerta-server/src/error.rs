//! HTTP error mapping.
//!
//! Wraps the shared domain error and maps each kind to a status code with a
//! JSON `{"message": ...}` body. Internal failures are logged and replaced
//! with a generic message.

use alerta_core::Error;
use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;

/// An error returned by an API handler.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub Error);

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match self.0 {
      Error::Unauthenticated(message) => (StatusCode::UNAUTHORIZED, message),
      Error::Unauthorized(message) => (StatusCode::FORBIDDEN, message),
      Error::Validation(message) => (StatusCode::BAD_REQUEST, message),
      Error::IncidentNotFound(_) => {
        (StatusCode::NOT_FOUND, "Incidente no encontrado".to_string())
      }
      Error::UserNotFound(_) => {
        (StatusCode::NOT_FOUND, "Usuario no encontrado".to_string())
      }
      Error::DuplicateVote(_) => (
        StatusCode::CONFLICT,
        "El usuario ya registró su voto de significancia".to_string(),
      ),
      Error::UserExists(_) => {
        (StatusCode::CONFLICT, "El usuario ya existe".to_string())
      }
      Error::IdCollision(id) => {
        tracing::error!(incident_id = %id, "incident id collision");
        (StatusCode::CONFLICT, "Conflicto de identificador".to_string())
      }
      Error::Internal(reason) => {
        tracing::error!(%reason, "internal error");
        (StatusCode::INTERNAL_SERVER_ERROR, "Error interno".to_string())
      }
    };
    (status, Json(json!({ "message": message }))).into_response()
  }
}
