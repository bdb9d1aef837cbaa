//! `POST /identify`.

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
};
use ident_core::{identity::ConsolidatedIdentity, store::ContactStore};
use serde::Serialize;
use serde_json::Value;

use crate::{
  AppState,
  error::ApiError,
  validate::{self, FieldError},
};

/// Request body. `phoneNumber` may arrive as a JSON string or number.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IdentifyBody {
  pub email:        Option<String>,
  pub phone_number: Option<String>,
}

impl IdentifyBody {
  /// Read the body out of parsed JSON, reporting every field of the wrong
  /// type. Unknown fields are ignored.
  pub fn from_json(value: Value) -> Result<Self, Vec<FieldError>> {
    let Value::Object(mut fields) = value else {
      return Err(vec![FieldError::new("", "Expected a JSON object")]);
    };

    let mut errors = Vec::new();
    let email = match fields.remove("email") {
      None | Some(Value::Null) => None,
      Some(Value::String(s)) => Some(s),
      Some(_) => {
        errors.push(FieldError::new("email", "Expected string"));
        None
      }
    };
    let phone_number = match fields.remove("phoneNumber") {
      None | Some(Value::Null) => None,
      Some(Value::String(s)) => Some(s),
      Some(Value::Number(n)) => Some(n.to_string()),
      Some(_) => {
        errors.push(FieldError::new("phoneNumber", "Expected string or number"));
        None
      }
    };

    if errors.is_empty() {
      Ok(Self {
        email,
        phone_number,
      })
    } else {
      Err(errors)
    }
  }
}

#[derive(Debug, Serialize)]
pub struct IdentifyResponse {
  pub contact: ConsolidatedIdentity,
}

pub async fn handler<S>(
  State(state): State<AppState<S>>,
  body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<IdentifyResponse>, ApiError>
where
  S: ContactStore + 'static,
{
  let Json(value) = body.map_err(|rejection| ApiError::InvalidJson {
    status:  rejection.status(),
    message: rejection.body_text(),
  })?;
  let body = IdentifyBody::from_json(value).map_err(ApiError::Validation)?;

  let email = body.email.as_deref().map(str::trim);
  let phone_number = body.phone_number.as_deref().map(str::trim);
  validate::identify(email, phone_number).map_err(ApiError::Validation)?;

  let contact = state.resolver.resolve(email, phone_number).await?;
  Ok(Json(IdentifyResponse { contact }))
}
