//! In-memory [`ContactStore`] backend.
//!
//! Intended for tests and embedders that need no durability. A transaction
//! works on a copy of the state that replaces the original only when the
//! transaction body succeeds.

use std::{collections::BTreeMap, sync::Mutex};

use chrono::Utc;

use crate::{
  Error, Result,
  contact::{Contact, ContactId, ContactPatch, NewContact},
  store::{ContactStore, ContactTx},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
  contacts: BTreeMap<ContactId, Contact>,
  next_id:  ContactId,
}

/// A contact store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
  state: Mutex<MemoryState>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// Seed a store with existing rows, ids and timestamps kept as given.
  /// No invariants are checked, so this can also reproduce damaged data.
  pub fn from_contacts(contacts: impl IntoIterator<Item = Contact>) -> Self {
    let contacts: BTreeMap<_, _> = contacts.into_iter().map(|c| (c.id, c)).collect();
    let next_id = contacts.keys().next_back().copied().unwrap_or(0);
    Self {
      state: Mutex::new(MemoryState { contacts, next_id }),
    }
  }
}

fn poisoned() -> Error { Error::Store("poisoned lock: memory store".into()) }

impl ContactStore for MemoryStore {
  async fn run_in_transaction<F, T>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&mut dyn ContactTx) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let mut guard = self.state.lock().map_err(|_| poisoned())?;
    let mut working = guard.clone();
    let out = f(&mut MemoryTx { state: &mut working })?;
    *guard = working;
    Ok(out)
  }

  async fn ping(&self) -> Result<()> {
    self.state.lock().map(|_| ()).map_err(|_| poisoned())
  }
}

// ─── Transaction ─────────────────────────────────────────────────────────────

struct MemoryTx<'a> {
  state: &'a mut MemoryState,
}

impl MemoryTx<'_> {
  fn live(&self) -> impl Iterator<Item = &Contact> {
    self.state.contacts.values().filter(|c| !c.is_deleted())
  }
}

impl ContactTx for MemoryTx<'_> {
  fn find_by_email_or_phone(
    &mut self,
    email: Option<&str>,
    phone_number: Option<&str>,
  ) -> Result<Vec<Contact>> {
    Ok(
      self
        .live()
        .filter(|c| {
          (email.is_some() && c.email.as_deref() == email)
            || (phone_number.is_some() && c.phone_number.as_deref() == phone_number)
        })
        .cloned()
        .collect(),
    )
  }

  fn get_contact(&mut self, id: ContactId) -> Result<Option<Contact>> {
    Ok(self.state.contacts.get(&id).filter(|c| !c.is_deleted()).cloned())
  }

  fn find_linked(&mut self, primary_id: ContactId) -> Result<Vec<Contact>> {
    Ok(
      self
        .live()
        .filter(|c| c.linked_id == Some(primary_id))
        .cloned()
        .collect(),
    )
  }

  fn list_contacts(&mut self) -> Result<Vec<Contact>> {
    Ok(self.state.contacts.values().cloned().collect())
  }

  fn create_contact(&mut self, input: NewContact) -> Result<Contact> {
    if !input.has_identifier() {
      return Err(Error::InvalidInput(
        "a contact needs an email or a phone number".into(),
      ));
    }

    self.state.next_id += 1;
    let now = Utc::now();
    let contact = Contact {
      id:              self.state.next_id,
      email:           input.email,
      phone_number:    input.phone_number,
      linked_id:       input.linked_id,
      link_precedence: input.link_precedence,
      created_at:      now,
      updated_at:      now,
      deleted_at:      None,
    };
    self.state.contacts.insert(contact.id, contact.clone());
    Ok(contact)
  }

  fn update_contact(&mut self, id: ContactId, patch: ContactPatch) -> Result<Contact> {
    let contact = self
      .state
      .contacts
      .get_mut(&id)
      .ok_or(Error::ContactNotFound(id))?;

    if let Some(expected) = patch.expect
      && contact.link_state() != expected
    {
      return Err(Error::ConcurrencyConflict(format!(
        "contact {id} changed since it was read"
      )));
    }

    let link = patch.apply_link(contact.link_state());
    contact.link_precedence = link.precedence;
    contact.linked_id = link.linked_id;
    if let Some(at) = patch.deleted_at {
      contact.deleted_at = Some(at);
    }
    contact.updated_at = Utc::now();
    Ok(contact.clone())
  }
}
