//! The consolidated view of one identity group, as returned to callers.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  contact::{Contact, ContactId},
};

/// Every email, phone number and secondary id reachable from one primary.
///
/// Serialises to the `contact` object of the identify response:
/// `{ "primaryContactId", "emails", "phoneNumbers", "secondaryContactIds" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedIdentity {
  pub primary_contact_id:    ContactId,
  /// Primary's email first, then secondaries oldest-first, deduplicated.
  pub emails:                Vec<String>,
  /// Same ordering rule as `emails`.
  pub phone_numbers:         Vec<String>,
  /// Oldest first.
  pub secondary_contact_ids: Vec<ContactId>,
}

/// Assemble the consolidated view of a group.
///
/// `secondaries` may arrive in any order; they are ordered by creation time
/// (ties broken by id). The primary must actually be a PRIMARY contact with
/// at least one identifier.
pub fn format(primary: &Contact, secondaries: &[Contact]) -> Result<ConsolidatedIdentity> {
  if !primary.is_primary() {
    return Err(Error::InvariantViolation(format!(
      "contact {} is not a primary",
      primary.id
    )));
  }
  if !primary.has_identifier() {
    return Err(Error::InvariantViolation(format!(
      "primary contact {} has no identifier",
      primary.id
    )));
  }

  let mut ordered: Vec<&Contact> = secondaries.iter().collect();
  ordered.sort_by_key(|c| c.seniority());

  let members = || std::iter::once(primary).chain(ordered.iter().copied());

  Ok(ConsolidatedIdentity {
    primary_contact_id:    primary.id,
    emails:                dedup(members().filter_map(|c| c.email.as_deref())),
    phone_numbers:         dedup(members().filter_map(|c| c.phone_number.as_deref())),
    secondary_contact_ids: ordered.iter().map(|c| c.id).collect(),
  })
}

/// Order-preserving deduplication.
fn dedup<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
  let mut seen = HashSet::new();
  values
    .filter(|v| seen.insert(*v))
    .map(str::to_owned)
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone as _, Utc};

  use super::*;
  use crate::contact::LinkPrecedence;

  fn at(minutes: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
  }

  fn primary(id: ContactId, email: Option<&str>, phone: Option<&str>) -> Contact {
    Contact {
      id,
      email: email.map(str::to_owned),
      phone_number: phone.map(str::to_owned),
      linked_id: None,
      link_precedence: LinkPrecedence::Primary,
      created_at: at(0),
      updated_at: at(0),
      deleted_at: None,
    }
  }

  fn secondary(
    id: ContactId,
    email: Option<&str>,
    phone: Option<&str>,
    root: ContactId,
    minutes: i64,
  ) -> Contact {
    Contact {
      linked_id: Some(root),
      link_precedence: LinkPrecedence::Secondary,
      created_at: at(minutes),
      updated_at: at(minutes),
      ..primary(id, email, phone)
    }
  }

  #[test]
  fn singleton_identity() {
    let p = primary(1, Some("a@x.com"), None);
    let id = format(&p, &[]).unwrap();
    assert_eq!(id.primary_contact_id, 1);
    assert_eq!(id.emails, ["a@x.com"]);
    assert!(id.phone_numbers.is_empty());
    assert!(id.secondary_contact_ids.is_empty());
  }

  #[test]
  fn primary_values_come_first_and_duplicates_collapse() {
    let p = primary(1, Some("a@x.com"), Some("123"));
    let secondaries = [
      secondary(4, Some("c@x.com"), Some("123"), 1, 30),
      secondary(2, Some("b@x.com"), Some("456"), 1, 10),
      secondary(3, Some("a@x.com"), Some("789"), 1, 20),
    ];

    let id = format(&p, &secondaries).unwrap();
    assert_eq!(id.emails, ["a@x.com", "b@x.com", "c@x.com"]);
    assert_eq!(id.phone_numbers, ["123", "456", "789"]);
    assert_eq!(id.secondary_contact_ids, [2, 3, 4]);
  }

  #[test]
  fn equal_timestamps_fall_back_to_id_order() {
    let p = primary(1, None, Some("111"));
    let secondaries = [
      secondary(9, None, Some("999"), 1, 5),
      secondary(5, None, Some("555"), 1, 5),
    ];
    let id = format(&p, &secondaries).unwrap();
    assert_eq!(id.secondary_contact_ids, [5, 9]);
    assert_eq!(id.phone_numbers, ["111", "555", "999"]);
  }

  #[test]
  fn rejects_secondary_as_primary() {
    let s = secondary(2, Some("a@x.com"), None, 1, 0);
    assert!(matches!(format(&s, &[]), Err(Error::InvariantViolation(_))));
  }

  #[test]
  fn rejects_empty_primary() {
    let p = primary(1, None, None);
    assert!(matches!(format(&p, &[]), Err(Error::InvariantViolation(_))));
  }

  #[test]
  fn serialises_to_wire_shape() {
    let p = primary(1, Some("a@x.com"), Some("123"));
    let json = serde_json::to_value(format(&p, &[]).unwrap()).unwrap();
    assert_eq!(
      json,
      serde_json::json!({
        "primaryContactId": 1,
        "emails": ["a@x.com"],
        "phoneNumbers": ["123"],
        "secondaryContactIds": [],
      })
    );
  }
}
