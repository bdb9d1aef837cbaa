//! The `ContactStore` and `ContactTx` traits.
//!
//! Backends (e.g. `ident-store-sqlite`, [`crate::memory::MemoryStore`])
//! implement both. The resolver only ever touches contacts through a
//! [`ContactTx`] handed to it by [`ContactStore::run_in_transaction`], so the
//! whole read-decide-write sequence of one request is atomic.

use std::future::Future;

use crate::{
  Result,
  contact::{Contact, ContactId, ContactPatch, NewContact},
};

// ─── Transaction ─────────────────────────────────────────────────────────────

/// Operations available inside a store transaction.
///
/// Methods are synchronous: a backend runs the whole transaction body in one
/// place (e.g. on its connection thread) and either commits every write or
/// none of them.
pub trait ContactTx {
  /// All non-deleted contacts whose email equals `email` or whose phone
  /// number equals `phone_number`. Absent inputs match nothing.
  fn find_by_email_or_phone(
    &mut self,
    email: Option<&str>,
    phone_number: Option<&str>,
  ) -> Result<Vec<Contact>>;

  /// A non-deleted contact by id.
  fn get_contact(&mut self, id: ContactId) -> Result<Option<Contact>>;

  /// Non-deleted contacts whose `linked_id` equals `primary_id`.
  fn find_linked(&mut self, primary_id: ContactId) -> Result<Vec<Contact>>;

  /// Every contact, soft-deleted ones included, in id order.
  fn list_contacts(&mut self) -> Result<Vec<Contact>>;

  /// Persist a new contact. Fails with
  /// [`InvalidInput`](crate::Error::InvalidInput) if it carries no
  /// identifier.
  fn create_contact(&mut self, input: NewContact) -> Result<Contact>;

  /// Apply `patch` to contact `id` and return the updated row.
  ///
  /// Fails with [`ContactNotFound`](crate::Error::ContactNotFound) if the row
  /// does not exist and with
  /// [`ConcurrencyConflict`](crate::Error::ConcurrencyConflict) if
  /// `patch.expect` no longer matches the stored linkage.
  fn update_contact(&mut self, id: ContactId, patch: ContactPatch) -> Result<Contact>;
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Abstraction over an Ident contact store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ContactStore: Send + Sync {
  /// Run `f` inside a transaction. Writes made through the [`ContactTx`]
  /// are committed if `f` returns `Ok` and rolled back otherwise; a caller
  /// that stops polling the returned future never observes partial writes.
  fn run_in_transaction<F, T>(
    &self,
    f: F,
  ) -> impl Future<Output = Result<T>> + Send + '_
  where
    F: FnOnce(&mut dyn ContactTx) -> Result<T> + Send + 'static,
    T: Send + 'static;

  /// Cheap liveness probe used by health checks.
  fn ping(&self) -> impl Future<Output = Result<()>> + Send + '_;

  // ── Single-operation conveniences ─────────────────────────────────────

  fn find_by_email_or_phone(
    &self,
    email: Option<String>,
    phone_number: Option<String>,
  ) -> impl Future<Output = Result<Vec<Contact>>> + Send + '_ {
    self.run_in_transaction(move |tx| {
      tx.find_by_email_or_phone(email.as_deref(), phone_number.as_deref())
    })
  }

  fn get_contact(
    &self,
    id: ContactId,
  ) -> impl Future<Output = Result<Option<Contact>>> + Send + '_ {
    self.run_in_transaction(move |tx| tx.get_contact(id))
  }

  fn create_contact(
    &self,
    input: NewContact,
  ) -> impl Future<Output = Result<Contact>> + Send + '_ {
    self.run_in_transaction(move |tx| tx.create_contact(input))
  }

  fn update_contact(
    &self,
    id: ContactId,
    patch: ContactPatch,
  ) -> impl Future<Output = Result<Contact>> + Send + '_ {
    self.run_in_transaction(move |tx| tx.update_contact(id, patch))
  }

  fn list_contacts(&self) -> impl Future<Output = Result<Vec<Contact>>> + Send + '_ {
    self.run_in_transaction(|tx| tx.list_contacts())
  }
}
