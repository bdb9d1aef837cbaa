//! The contact row, the single entity of the identity graph.
//!
//! Every contact carries at least one identifier (email or phone number).
//! Contacts are grouped into identities: one PRIMARY contact per group, and
//! every other member is a SECONDARY whose `linked_id` points directly at it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Store-assigned, immutable contact identifier.
pub type ContactId = i64;

// ─── Precedence ──────────────────────────────────────────────────────────────

/// Whether a contact is the canonical representative of its group.
///
/// The string form (`"PRIMARY"` / `"SECONDARY"`) is shared by the JSON
/// representation and the database column.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum LinkPrecedence {
  Primary,
  Secondary,
}

/// The observable linkage of a contact: its precedence plus the id it points
/// at. Used as the compare-and-swap guard when rewriting links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkState {
  pub precedence: LinkPrecedence,
  pub linked_id:  Option<ContactId>,
}

impl LinkState {
  pub const PRIMARY: Self = Self {
    precedence: LinkPrecedence::Primary,
    linked_id:  None,
  };

  pub fn secondary_of(primary: ContactId) -> Self {
    Self {
      precedence: LinkPrecedence::Secondary,
      linked_id:  Some(primary),
    }
  }
}

// ─── Contact ─────────────────────────────────────────────────────────────────

/// A stored contact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
  pub id:              ContactId,
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  /// Present iff `link_precedence` is [`LinkPrecedence::Secondary`].
  pub linked_id:       Option<ContactId>,
  pub link_precedence: LinkPrecedence,
  pub created_at:      DateTime<Utc>,
  /// Changes on every mutation.
  pub updated_at:      DateTime<Utc>,
  /// Soft-delete marker; deleted contacts never take part in matching.
  pub deleted_at:      Option<DateTime<Utc>>,
}

impl Contact {
  pub fn is_primary(&self) -> bool {
    self.link_precedence == LinkPrecedence::Primary
  }

  pub fn is_deleted(&self) -> bool { self.deleted_at.is_some() }

  pub fn has_identifier(&self) -> bool {
    self.email.is_some() || self.phone_number.is_some()
  }

  pub fn link_state(&self) -> LinkState {
    LinkState {
      precedence: self.link_precedence,
      linked_id:  self.linked_id,
    }
  }

  /// Whether this contact carries every supplied identifier verbatim.
  /// Identifiers that are not supplied match anything.
  pub fn represents(&self, email: Option<&str>, phone_number: Option<&str>) -> bool {
    email.is_none_or(|e| self.email.as_deref() == Some(e))
      && phone_number.is_none_or(|p| self.phone_number.as_deref() == Some(p))
  }

  /// Sort key deciding which contact of a group is the oldest.
  pub fn seniority(&self) -> (DateTime<Utc>, ContactId) { (self.created_at, self.id) }
}

// ─── NewContact ──────────────────────────────────────────────────────────────

/// Input to [`crate::store::ContactTx::create_contact`].
/// `id` and the timestamps are always assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  pub linked_id:       Option<ContactId>,
  pub link_precedence: LinkPrecedence,
}

impl NewContact {
  /// A fresh identity with no links.
  pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
    Self {
      email,
      phone_number,
      linked_id: None,
      link_precedence: LinkPrecedence::Primary,
    }
  }

  /// A new member of the group rooted at `primary`.
  pub fn secondary(
    email: Option<String>,
    phone_number: Option<String>,
    primary: ContactId,
  ) -> Self {
    Self {
      email,
      phone_number,
      linked_id: Some(primary),
      link_precedence: LinkPrecedence::Secondary,
    }
  }

  pub fn has_identifier(&self) -> bool {
    self.email.is_some() || self.phone_number.is_some()
  }
}

// ─── ContactPatch ────────────────────────────────────────────────────────────

/// Input to [`crate::store::ContactTx::update_contact`]. `None` fields are
/// left untouched; `updated_at` is always bumped by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactPatch {
  pub link_precedence: Option<LinkPrecedence>,
  /// Only applied together with `link_precedence`; a primary never keeps a
  /// linked id, so setting precedence to PRIMARY clears it.
  pub linked_id:       Option<ContactId>,
  pub deleted_at:      Option<DateTime<Utc>>,
  /// If set, the update only applies while the stored row still has this
  /// linkage; otherwise the store reports a concurrency conflict.
  pub expect:          Option<LinkState>,
}

impl ContactPatch {
  /// Re-point a contact at `primary` as a SECONDARY, guarded on the linkage
  /// that was observed when the merge was planned.
  pub fn demote(primary: ContactId, observed: LinkState) -> Self {
    Self {
      link_precedence: Some(LinkPrecedence::Secondary),
      linked_id: Some(primary),
      deleted_at: None,
      expect: Some(observed),
    }
  }

  pub fn soft_delete(at: DateTime<Utc>) -> Self {
    Self {
      deleted_at: Some(at),
      ..Self::default()
    }
  }

  /// The linkage a row ends up with once this patch is applied to `current`.
  pub fn apply_link(&self, current: LinkState) -> LinkState {
    match self.link_precedence {
      Some(LinkPrecedence::Primary) => LinkState::PRIMARY,
      Some(LinkPrecedence::Secondary) => LinkState {
        precedence: LinkPrecedence::Secondary,
        linked_id:  self.linked_id.or(current.linked_id),
      },
      None => current,
    }
  }
}
