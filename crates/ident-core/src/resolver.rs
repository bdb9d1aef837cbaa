//! The identity graph resolver.
//!
//! Given an email and/or phone number, the resolver finds every contact that
//! shares either value, works out which identity groups those contacts belong
//! to, merges the groups if there is more than one, records any value it has
//! not seen before, and returns the consolidated view of the resulting group.
//!
//! Groups are always kept flat: one PRIMARY and SECONDARY contacts that point
//! directly at it. Reading a group therefore never needs a recursive walk.

use std::{
  collections::{BTreeMap, HashSet},
  sync::Arc,
};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
  CorruptGraph, Error, Result,
  contact::{Contact, ContactId, ContactPatch, LinkState, NewContact},
  identity::{self, ConsolidatedIdentity},
  store::{ContactStore, ContactTx},
};

/// Links a contact may follow to reach its primary. Groups are depth 1, so
/// anything further is corruption.
pub const MAX_LINK_HOPS: usize = 1;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResolverConfig {
  /// How many times a resolve that hit a concurrency conflict is retried
  /// from scratch before the conflict is surfaced.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
}

fn default_max_retries() -> u32 { 2 }

impl Default for ResolverConfig {
  fn default() -> Self {
    Self {
      max_retries: default_max_retries(),
    }
  }
}

// ─── Request ─────────────────────────────────────────────────────────────────

/// A normalised identify request: trimmed, with empty strings dropped, and
/// carrying at least one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyRequest {
  email:        Option<String>,
  phone_number: Option<String>,
}

impl IdentifyRequest {
  pub fn new(email: Option<&str>, phone_number: Option<&str>) -> Result<Self> {
    let clean = |v: Option<&str>| {
      v.map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
    };
    let request = Self {
      email:        clean(email),
      phone_number: clean(phone_number),
    };
    if request.email.is_none() && request.phone_number.is_none() {
      return Err(Error::InvalidInput(
        "at least one of email or phoneNumber must be provided".into(),
      ));
    }
    Ok(request)
  }

  pub fn email(&self) -> Option<&str> { self.email.as_deref() }

  pub fn phone_number(&self) -> Option<&str> { self.phone_number.as_deref() }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Resolves identify requests against a [`ContactStore`].
///
/// Holds no per-request state; one instance is shared by every request
/// handler.
pub struct Resolver<S> {
  store:  Arc<S>,
  config: ResolverConfig,
}

impl<S: ContactStore> Resolver<S> {
  pub fn new(store: Arc<S>, config: ResolverConfig) -> Self { Self { store, config } }

  pub fn store(&self) -> &Arc<S> { &self.store }

  /// Resolve an email and/or phone number to its consolidated identity,
  /// creating or merging contacts as needed.
  ///
  /// The whole operation runs in one store transaction. Concurrency
  /// conflicts are retried up to [`ResolverConfig::max_retries`] times.
  pub async fn resolve(
    &self,
    email: Option<&str>,
    phone_number: Option<&str>,
  ) -> Result<ConsolidatedIdentity> {
    let request = IdentifyRequest::new(email, phone_number)?;

    let mut attempt = 0;
    loop {
      let req = request.clone();
      match self.store.run_in_transaction(move |tx| resolve_in(tx, &req)).await {
        Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
          attempt += 1;
          warn!(attempt, error = %e, "retrying identify after conflict");
        }
        other => return other,
      }
    }
  }
}

/// One resolve attempt against an open transaction.
pub fn resolve_in(tx: &mut dyn ContactTx, req: &IdentifyRequest) -> Result<ConsolidatedIdentity> {
  let matches = tx.find_by_email_or_phone(req.email(), req.phone_number())?;

  if matches.is_empty() {
    let created = tx.create_contact(NewContact::primary(
      req.email.clone(),
      req.phone_number.clone(),
    ))?;
    debug!(id = created.id, "created primary contact");
    return identity::format(&created, &[]);
  }

  // Roots keyed by id so each group is visited once.
  let mut roots: BTreeMap<ContactId, Contact> = BTreeMap::new();
  for contact in matches {
    let root = find_root(tx, contact)?;
    roots.entry(root.id).or_insert(root);
  }

  let mut roots: Vec<Contact> = roots.into_values().collect();
  roots.sort_by_key(Contact::seniority);
  let mut roots = roots.into_iter();
  let Some(survivor) = roots.next() else {
    return Err(Error::InvariantViolation("matched contacts without a root".into()));
  };
  let absorbed: Vec<Contact> = roots.collect();
  let merged = !absorbed.is_empty();

  if merged {
    revalidate_survivor(tx, &survivor)?;
    for root in &absorbed {
      absorb(tx, &survivor, root)?;
    }
  }

  let mut secondaries = read_group(tx, &survivor)?;

  if let Some((email, phone_number)) = unseen_values(req, &survivor, &secondaries, merged) {
    let created = tx.create_contact(NewContact::secondary(email, phone_number, survivor.id))?;
    debug!(id = created.id, primary = survivor.id, "created secondary contact");
    secondaries.push(created);
  }

  identity::format(&survivor, &secondaries)
}

/// Follow `linked_id` from `contact` to its primary, at most
/// [`MAX_LINK_HOPS`] links away.
fn find_root(tx: &mut dyn ContactTx, contact: Contact) -> Result<Contact> {
  let start = contact.id;
  let mut visited = HashSet::from([start]);
  let mut current = contact;

  for _ in 0..=MAX_LINK_HOPS {
    if current.is_primary() {
      if current.linked_id.is_some() {
        return Err(CorruptGraph::LinkedPrimary(current.id).into());
      }
      return Ok(current);
    }

    let next = current.linked_id.ok_or(CorruptGraph::MissingLink(current.id))?;
    if next == current.id {
      return Err(CorruptGraph::SelfLink(current.id).into());
    }
    if !visited.insert(next) {
      return Err(CorruptGraph::Cycle(next).into());
    }
    current = tx.get_contact(next)?.ok_or(CorruptGraph::DanglingLink {
      from: current.id,
      to:   next,
    })?;
  }

  Err(CorruptGraph::TooDeep(start).into())
}

/// Optimistic check that the survivor picked from the initial read is still a
/// root before any demotion is written.
fn revalidate_survivor(tx: &mut dyn ContactTx, survivor: &Contact) -> Result<()> {
  match tx.get_contact(survivor.id)? {
    Some(current) if current.link_state() == LinkState::PRIMARY => Ok(()),
    _ => Err(Error::ConcurrencyConflict(format!(
      "primary {} changed before merge",
      survivor.id
    ))),
  }
}

/// Demote `root` under `survivor` and re-point its children at `survivor`.
///
/// Soft-deleted children keep their old `linked_id`; nothing reads through
/// them.
fn absorb(tx: &mut dyn ContactTx, survivor: &Contact, root: &Contact) -> Result<()> {
  let children = tx.find_linked(root.id)?;

  tx.update_contact(root.id, ContactPatch::demote(survivor.id, LinkState::PRIMARY))?;
  for child in &children {
    if child.is_primary() {
      return Err(CorruptGraph::LinkedPrimary(child.id).into());
    }
    tx.update_contact(
      child.id,
      ContactPatch::demote(survivor.id, LinkState::secondary_of(root.id)),
    )?;
  }

  debug!(
    survivor = survivor.id,
    absorbed = root.id,
    children = children.len(),
    "merged identity groups"
  );
  Ok(())
}

/// Every secondary currently linked to `primary`.
fn read_group(tx: &mut dyn ContactTx, primary: &Contact) -> Result<Vec<Contact>> {
  let secondaries = tx.find_linked(primary.id)?;
  if let Some(c) = secondaries.iter().find(|c| c.is_primary()) {
    return Err(CorruptGraph::LinkedPrimary(c.id).into());
  }
  Ok(secondaries)
}

/// The values a new secondary should carry, or `None` if the request adds
/// nothing to the group.
///
/// Within one group only unseen values are recorded. When groups were just
/// merged, the request's pair is what links them, so it is recorded verbatim
/// unless some contact already carries it.
fn unseen_values(
  req: &IdentifyRequest,
  primary: &Contact,
  secondaries: &[Contact],
  merged: bool,
) -> Option<(Option<String>, Option<String>)> {
  let mut group = std::iter::once(primary).chain(secondaries);

  if merged {
    if group.any(|c| c.represents(req.email(), req.phone_number())) {
      return None;
    }
    return Some((req.email.clone(), req.phone_number.clone()));
  }

  let members: Vec<&Contact> = group.collect();
  let email = req
    .email()
    .filter(|e| !members.iter().any(|c| c.email.as_deref() == Some(*e)))
    .map(str::to_owned);
  let phone_number = req
    .phone_number()
    .filter(|p| !members.iter().any(|c| c.phone_number.as_deref() == Some(*p)))
    .map(str::to_owned);

  if email.is_none() && phone_number.is_none() {
    return None;
  }
  Some((email, phone_number))
}
