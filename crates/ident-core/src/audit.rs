//! Whole-store integrity check for the identity graph.
//!
//! Non-deleted contacts are grouped into components connected by a shared
//! email, a shared phone number or a `linked_id` edge. Each component must
//! have exactly one PRIMARY, which carries no link, and every other member
//! must be a SECONDARY pointing directly at that PRIMARY.

use std::collections::{BTreeMap, HashMap};

use crate::{
  CorruptGraph, Result,
  contact::{Contact, ContactId},
};

/// Summary of a graph that passed [`verify_graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphReport {
  pub contacts: usize,
  pub groups:   usize,
  /// Soft-deleted rows, which are ignored by the check.
  pub deleted:  usize,
}

/// Check every invariant of the identity graph over a full store snapshot.
pub fn verify_graph(contacts: &[Contact]) -> Result<GraphReport> {
  let live: Vec<&Contact> = contacts.iter().filter(|c| !c.is_deleted()).collect();
  let index: HashMap<ContactId, usize> =
    live.iter().enumerate().map(|(i, c)| (c.id, i)).collect();

  let mut sets = DisjointSet::new(live.len());
  let mut by_email: HashMap<&str, usize> = HashMap::new();
  let mut by_phone: HashMap<&str, usize> = HashMap::new();

  for (i, c) in live.iter().enumerate() {
    if !c.has_identifier() {
      return Err(CorruptGraph::NoIdentifier(c.id).into());
    }
    if let Some(email) = c.email.as_deref() {
      let first = *by_email.entry(email).or_insert(i);
      sets.union(first, i);
    }
    if let Some(phone) = c.phone_number.as_deref() {
      let first = *by_phone.entry(phone).or_insert(i);
      sets.union(first, i);
    }
    if let Some(linked) = c.linked_id {
      let &target = index.get(&linked).ok_or(CorruptGraph::DanglingLink {
        from: c.id,
        to:   linked,
      })?;
      sets.union(target, i);
    }
  }

  let mut groups: BTreeMap<usize, Vec<&Contact>> = BTreeMap::new();
  for (i, c) in live.iter().enumerate() {
    groups.entry(sets.find(i)).or_default().push(c);
  }

  for members in groups.values() {
    verify_group(members)?;
  }

  Ok(GraphReport {
    contacts: live.len(),
    groups:   groups.len(),
    deleted:  contacts.len() - live.len(),
  })
}

fn verify_group(members: &[&Contact]) -> Result<()> {
  let primaries: Vec<&Contact> = members.iter().copied().filter(|c| c.is_primary()).collect();
  let primary = match primaries.as_slice() {
    [one] => *one,
    [] => return Err(CorruptGraph::NoPrimary(members[0].id).into()),
    many => {
      return Err(
        CorruptGraph::MultiplePrimaries(many.iter().map(|c| c.id).collect()).into(),
      );
    }
  };

  if primary.linked_id.is_some() {
    return Err(CorruptGraph::LinkedPrimary(primary.id).into());
  }

  for c in members.iter().filter(|c| !c.is_primary()) {
    match c.linked_id {
      None => return Err(CorruptGraph::MissingLink(c.id).into()),
      Some(linked) if linked != primary.id => {
        return Err(
          CorruptGraph::WrongPrimary {
            contact: c.id,
            linked,
            primary: primary.id,
          }
          .into(),
        );
      }
      Some(_) => {}
    }
  }
  Ok(())
}

/// Union-find over contact positions.
struct DisjointSet {
  parent: Vec<usize>,
}

impl DisjointSet {
  fn new(n: usize) -> Self {
    Self {
      parent: (0..n).collect(),
    }
  }

  fn find(&mut self, mut i: usize) -> usize {
    while self.parent[i] != i {
      self.parent[i] = self.parent[self.parent[i]];
      i = self.parent[i];
    }
    i
  }

  fn union(&mut self, a: usize, b: usize) {
    let (ra, rb) = (self.find(a), self.find(b));
    if ra != rb {
      self.parent[rb.max(ra)] = ra.min(rb);
    }
  }
}
