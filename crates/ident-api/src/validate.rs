//! Shape checks for identify requests, applied before the resolver runs.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static EMAIL_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

static PHONE_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[+]?[\d\s\-()]+$").unwrap());

const PHONE_MIN_LEN: usize = 10;
const PHONE_MAX_LEN: usize = 15;

/// One failed check, reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
  /// Request field the check applies to; empty for whole-body checks.
  pub field:   String,
  pub message: String,
}

impl FieldError {
  pub(crate) fn new(field: &str, message: impl Into<String>) -> Self {
    Self {
      field:   field.to_owned(),
      message: message.into(),
    }
  }
}

/// Check an identify request. Returns every failed check, not just the
/// first.
pub fn identify(email: Option<&str>, phone_number: Option<&str>) -> Result<(), Vec<FieldError>> {
  let mut errors = Vec::new();

  if let Some(email) = email
    && !EMAIL_RE.is_match(email)
  {
    errors.push(FieldError::new("email", "Invalid email"));
  }

  if let Some(phone) = phone_number {
    let len = phone.chars().count();
    if !PHONE_RE.is_match(phone) {
      errors.push(FieldError::new("phoneNumber", "Invalid phone number format"));
    }
    if len < PHONE_MIN_LEN {
      errors.push(FieldError::new(
        "phoneNumber",
        format!("Phone number must contain at least {PHONE_MIN_LEN} characters"),
      ));
    }
    if len > PHONE_MAX_LEN {
      errors.push(FieldError::new(
        "phoneNumber",
        format!("Phone number must contain at most {PHONE_MAX_LEN} characters"),
      ));
    }
  }

  let present = |v: Option<&str>| v.is_some_and(|v| !v.is_empty());
  if !present(email) && !present(phone_number) {
    errors.push(FieldError::new(
      "",
      "At least one of email or phoneNumber must be provided",
    ));
  }

  if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fields(r: Result<(), Vec<FieldError>>) -> Vec<String> {
    r.unwrap_err().into_iter().map(|e| e.field).collect()
  }

  #[test]
  fn accepts_plain_values() {
    assert!(identify(Some("lorraine@hillvalley.edu"), None).is_ok());
    assert!(identify(None, Some("(555) 010-0199")).is_ok());
    assert!(identify(Some("a@x.com"), Some("5550100199")).is_ok());
  }

  #[test]
  fn rejects_malformed_email() {
    assert_eq!(fields(identify(Some("not-an-email"), None)), ["email"]);
    assert_eq!(fields(identify(Some("a b@x.com"), None)), ["email"]);
  }

  #[test]
  fn rejects_bad_phone_characters_and_length() {
    assert_eq!(fields(identify(None, Some("555-CALL-NOW"))), ["phoneNumber"]);
    assert_eq!(fields(identify(None, Some("12345"))), ["phoneNumber"]);
    assert_eq!(fields(identify(None, Some("1234567890123456"))), ["phoneNumber"]);
  }

  #[test]
  fn requires_one_identifier() {
    let errors = identify(None, None).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "");
  }

  #[test]
  fn empty_email_is_reported_twice() {
    // Present but empty: fails the format check and counts as absent.
    assert_eq!(fields(identify(Some(""), None)), ["email", ""]);
  }
}
