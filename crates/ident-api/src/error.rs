//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error is rendered as
//! `{"error": {"status": .., "message": .., "code": .., "details": ..}}`.
//! Server-side failures are logged in full and answered with a generic
//! message.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::validate::FieldError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("validation failed")]
  Validation(Vec<FieldError>),

  #[error("invalid JSON body: {message}")]
  InvalidJson { status: StatusCode, message: String },

  #[error(transparent)]
  Resolve(#[from] ident_core::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
  status:  u16,
  message: String,
  code:    &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  details: Option<Vec<FieldError>>,
}

impl ApiError {
  fn body(self) -> (StatusCode, ErrorBody) {
    let (status, message, code, details) = match self {
      ApiError::Validation(details) => (
        StatusCode::BAD_REQUEST,
        "Validation failed".to_owned(),
        "VALIDATION_FAILED",
        Some(details),
      ),
      ApiError::InvalidJson { status, message } => (status, message, "INVALID_JSON", None),
      ApiError::Resolve(ident_core::Error::InvalidInput(message)) => {
        (StatusCode::BAD_REQUEST, message, "INVALID_INPUT", None)
      }
      ApiError::Resolve(e) => {
        tracing::error!(error = %e, source = ?e, "identify failed");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          "Internal server error".to_owned(),
          "INTERNAL_ERROR",
          None,
        )
      }
    };
    (status, ErrorBody {
      status: status.as_u16(),
      message,
      code,
      details,
    })
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = self.body();
    (status, Json(serde_json::json!({ "error": body }))).into_response()
  }
}
