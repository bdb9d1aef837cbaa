//! The SQLite implementation of [`ContactStore`].

use std::{path::Path, time::Duration};

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tracing::debug;

use ident_core::{
  contact::{Contact, ContactId, ContactPatch, NewContact},
  store::{ContactStore, ContactTx},
};

use crate::{
  Error, Result,
  encode::{CONTACT_COLUMNS, RawContact, encode_dt, encode_precedence},
  schema::SCHEMA,
};

/// How long a statement waits for another connection's lock before SQLite
/// reports the database as busy.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Ident contact store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Every
/// transaction runs to completion on the connection thread, so dropping the
/// caller's future never leaves a transaction half-applied.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Timestamps are persisted at microsecond precision; values handed back to
/// callers are truncated the same way so they compare equal to a re-read.
fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

// ─── ContactStore impl ───────────────────────────────────────────────────────

impl ContactStore for SqliteStore {
  async fn run_in_transaction<F, T>(&self, f: F) -> ident_core::Result<T>
  where
    F: FnOnce(&mut dyn ContactTx) -> ident_core::Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let outcome = self
      .conn
      .call(move |conn| {
        // IMMEDIATE takes the write lock up front, so the read-decide-write
        // sequence sees no interleaved writer.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&mut SqliteTx { conn: &tx });
        if out.is_ok() {
          tx.commit()?;
        }
        // Dropping an uncommitted transaction rolls it back.
        Ok(out)
      })
      .await
      .map_err(Error::from)?;
    outcome
  }

  async fn ping(&self) -> ident_core::Result<()> {
    self
      .conn
      .call(|conn| {
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
      })
      .await
      .map_err(Error::from)?;
    Ok(())
  }
}

// ─── Transaction ─────────────────────────────────────────────────────────────

/// [`ContactTx`] over an open SQLite transaction.
struct SqliteTx<'a> {
  conn: &'a rusqlite::Connection,
}

impl SqliteTx<'_> {
  fn query_contacts(
    &self,
    where_clause: &str,
    params: impl rusqlite::Params,
  ) -> Result<Vec<Contact>> {
    let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE {where_clause} ORDER BY id");
    let mut stmt = self.conn.prepare_cached(&sql)?;
    let raws = stmt
      .query_map(params, RawContact::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawContact::into_contact).collect()
  }

  /// Fetch a row by id whether or not it is soft-deleted.
  fn fetch(&self, id: ContactId) -> Result<Option<Contact>> {
    let raw = self
      .conn
      .query_row(
        &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
        rusqlite::params![id],
        RawContact::from_row,
      )
      .optional()?;
    raw.map(RawContact::into_contact).transpose()
  }
}

impl ContactTx for SqliteTx<'_> {
  fn find_by_email_or_phone(
    &mut self,
    email: Option<&str>,
    phone_number: Option<&str>,
  ) -> ident_core::Result<Vec<Contact>> {
    // `col = NULL` is never true, so an absent input matches nothing.
    Ok(self.query_contacts(
      "deleted_at IS NULL AND (email = ?1 OR phone_number = ?2)",
      rusqlite::params![email, phone_number],
    )?)
  }

  fn get_contact(&mut self, id: ContactId) -> ident_core::Result<Option<Contact>> {
    Ok(self.fetch(id)?.filter(|c| !c.is_deleted()))
  }

  fn find_linked(&mut self, primary_id: ContactId) -> ident_core::Result<Vec<Contact>> {
    Ok(self.query_contacts(
      "deleted_at IS NULL AND linked_id = ?1",
      rusqlite::params![primary_id],
    )?)
  }

  fn list_contacts(&mut self) -> ident_core::Result<Vec<Contact>> {
    Ok(self.query_contacts("1 = 1", [])?)
  }

  fn create_contact(&mut self, input: NewContact) -> ident_core::Result<Contact> {
    if !input.has_identifier() {
      return Err(ident_core::Error::InvalidInput(
        "a contact needs an email or a phone number".into(),
      ));
    }

    let created_at = now();
    let at_str = encode_dt(created_at);
    self
      .conn
      .execute(
        "INSERT INTO contacts (
           email, phone_number, linked_id, link_precedence, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        rusqlite::params![
          input.email,
          input.phone_number,
          input.linked_id,
          encode_precedence(input.link_precedence),
          at_str,
        ],
      )
      .map_err(Error::from)?;

    let contact = Contact {
      id:              self.conn.last_insert_rowid(),
      email:           input.email,
      phone_number:    input.phone_number,
      linked_id:       input.linked_id,
      link_precedence: input.link_precedence,
      created_at,
      updated_at:      created_at,
      deleted_at:      None,
    };
    debug!(id = contact.id, precedence = %contact.link_precedence, "inserted contact");
    Ok(contact)
  }

  fn update_contact(
    &mut self,
    id: ContactId,
    patch: ContactPatch,
  ) -> ident_core::Result<Contact> {
    let current = self.fetch(id)?.ok_or(ident_core::Error::ContactNotFound(id))?;
    let observed = patch.expect.unwrap_or(current.link_state());
    let link = patch.apply_link(current.link_state());
    let deleted_at = patch.deleted_at.or(current.deleted_at);
    let updated_at = now();

    // Compare-and-swap on the linkage the caller planned against.
    let changed = self
      .conn
      .execute(
        "UPDATE contacts
            SET link_precedence = ?1, linked_id = ?2, deleted_at = ?3, updated_at = ?4
          WHERE id = ?5 AND link_precedence = ?6 AND linked_id IS ?7",
        rusqlite::params![
          encode_precedence(link.precedence),
          link.linked_id,
          deleted_at.map(encode_dt),
          encode_dt(updated_at),
          id,
          encode_precedence(observed.precedence),
          observed.linked_id,
        ],
      )
      .map_err(Error::from)?;

    if changed == 0 {
      return Err(ident_core::Error::ConcurrencyConflict(format!(
        "contact {id} changed since it was read"
      )));
    }

    Ok(Contact {
      link_precedence: link.precedence,
      linked_id: link.linked_id,
      deleted_at,
      updated_at,
      ..current
    })
  }
}
