//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with microsecond precision,
//! so lexical order matches chronological order. Link precedence is stored
//! as its upper-case name.

use chrono::{DateTime, SecondsFormat, Utc};
use ident_core::contact::{Contact, ContactId, LinkPrecedence};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── LinkPrecedence ──────────────────────────────────────────────────────────

pub fn encode_precedence(p: LinkPrecedence) -> &'static str {
  match p {
    LinkPrecedence::Primary => "PRIMARY",
    LinkPrecedence::Secondary => "SECONDARY",
  }
}

pub fn decode_precedence(s: &str) -> Result<LinkPrecedence> {
  s.parse()
    .map_err(|_| Error::UnknownPrecedence(s.to_owned()))
}

// ─── Row type ────────────────────────────────────────────────────────────────

/// Column list matching [`RawContact::from_row`].
pub const CONTACT_COLUMNS: &str =
  "id, email, phone_number, linked_id, link_precedence, created_at, updated_at, deleted_at";

/// Raw values read directly from a `contacts` row.
pub struct RawContact {
  pub id:              ContactId,
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  pub linked_id:       Option<ContactId>,
  pub link_precedence: String,
  pub created_at:      String,
  pub updated_at:      String,
  pub deleted_at:      Option<String>,
}

impl RawContact {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      email:           row.get(1)?,
      phone_number:    row.get(2)?,
      linked_id:       row.get(3)?,
      link_precedence: row.get(4)?,
      created_at:      row.get(5)?,
      updated_at:      row.get(6)?,
      deleted_at:      row.get(7)?,
    })
  }

  pub fn into_contact(self) -> Result<Contact> {
    Ok(Contact {
      id:              self.id,
      email:           self.email,
      phone_number:    self.phone_number,
      linked_id:       self.linked_id,
      link_precedence: decode_precedence(&self.link_precedence)?,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
      deleted_at:      self.deleted_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    use chrono::SubsecRound as _;

    let a = Utc::now().trunc_subsecs(6);
    let b = a + chrono::Duration::microseconds(1);
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(a)).unwrap(), a);
  }

  #[test]
  fn precedence_matches_core_string_form() {
    for p in [LinkPrecedence::Primary, LinkPrecedence::Secondary] {
      assert_eq!(encode_precedence(p), p.as_ref());
      assert_eq!(decode_precedence(encode_precedence(p)).unwrap(), p);
    }
    assert!(matches!(
      decode_precedence("TERTIARY"),
      Err(Error::UnknownPrecedence(_))
    ));
  }
}
