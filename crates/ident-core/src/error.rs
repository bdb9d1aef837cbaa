//! Error types for `ident-core`.

use thiserror::Error;

use crate::contact::ContactId;

#[derive(Debug, Error)]
pub enum Error {
  /// Neither an email nor a phone number was supplied.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// Stored links violate the depth-1 / single-primary structure.
  #[error("corrupt identity graph: {0}")]
  CorruptGraph(#[from] CorruptGraph),

  /// A compare-and-swap guard failed while rewriting a contact, or the
  /// backend reported lock contention.
  #[error("concurrency conflict: {0}")]
  ConcurrencyConflict(String),

  /// The formatter was handed something that is not a consolidated group.
  #[error("invariant violation: {0}")]
  InvariantViolation(String),

  #[error("contact not found: {0}")]
  ContactNotFound(ContactId),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Whether retrying the whole resolve may succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::ConcurrencyConflict(_))
  }
}

/// The specific way stored data breaks the identity-graph invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorruptGraph {
  #[error("secondary contact {0} has no linked id")]
  MissingLink(ContactId),

  #[error("contact {from} links to missing contact {to}")]
  DanglingLink { from: ContactId, to: ContactId },

  #[error("contact {0} links to itself")]
  SelfLink(ContactId),

  #[error("link cycle through contact {0}")]
  Cycle(ContactId),

  #[error("contact {0} is more than one hop away from its primary")]
  TooDeep(ContactId),

  #[error("primary contact {0} carries a linked id")]
  LinkedPrimary(ContactId),

  #[error("contact {0} has neither email nor phone number")]
  NoIdentifier(ContactId),

  #[error("group containing contact {0} has no primary")]
  NoPrimary(ContactId),

  #[error("group has more than one primary: {0:?}")]
  MultiplePrimaries(Vec<ContactId>),

  #[error("contact {contact} points at {linked}, expected primary {primary}")]
  WrongPrimary {
    contact: ContactId,
    linked:  ContactId,
    primary: ContactId,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
