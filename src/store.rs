//! The shared fact store.
//!
//! All programs publish into one namespace. Facts persist across epochs by
//! default; facts tagged dynamic are scoped to the epoch that produced them
//! and are cleared before the next evaluation. A [`Snapshot`] is the frozen,
//! order-preserving view one evaluation pass matches against.

use std::collections::HashMap;

use crate::fact::{Fact, FactKind, ProgramId};

/// A fact plus its store lifecycle tagging.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFact {
    /// The published fact.
    pub fact: Fact,
    /// Epoch-scoped facts are cleared before the next evaluation.
    pub dynamic: bool,
    /// Monotone insertion sequence, for stable match ordering.
    pub seq: u64,
}

/// Mutable, insertion-ordered collection of facts.
#[derive(Debug, Default)]
pub struct FactStore {
    facts: Vec<StoredFact>,
    next_seq: u64,
}

impl FactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fact. Does not deduplicate; supersede semantics are applied
    /// at snapshot time.
    pub fn insert(&mut self, fact: Fact, dynamic: bool) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.facts.push(StoredFact { fact, dynamic, seq });
    }

    /// Removes every fact for which the predicate holds.
    pub fn clear<F>(&mut self, predicate: F)
    where
        F: Fn(&StoredFact) -> bool,
    {
        self.facts.retain(|f| !predicate(f));
    }

    /// Drops the previous epoch's dynamic facts.
    pub fn clear_dynamic(&mut self) {
        self.clear(|f| f.dynamic);
    }

    /// Drops every fact published by the given program.
    pub fn remove_subject(&mut self, subject: &ProgramId) {
        self.clear(|f| &f.fact.subject == subject);
    }

    /// Number of stored facts (superseded writes included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Returns true if no facts are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Takes an immutable, order-preserving view for one evaluation pass.
    ///
    /// Claims with an identical `(subject, name)` collapse to the latest
    /// write (last-write-wins), positioned where that write happened. Wishes
    /// are never collapsed: several programs may wish the same thing and a
    /// `{someone}` variable must bind each wisher.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let mut latest: HashMap<(&ProgramId, &str), u64> = HashMap::new();
        for stored in &self.facts {
            if stored.fact.kind == FactKind::Claim {
                latest.insert((&stored.fact.subject, stored.fact.name.as_str()), stored.seq);
            }
        }

        let facts = self
            .facts
            .iter()
            .filter(|stored| {
                stored.fact.kind != FactKind::Claim
                    || latest[&(&stored.fact.subject, stored.fact.name.as_str())] == stored.seq
            })
            .map(|stored| stored.fact.clone())
            .collect();

        Snapshot { facts }
    }
}

/// An immutable, order-preserving view of the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    facts: Vec<Fact>,
}

impl Snapshot {
    /// The facts in insertion order.
    #[must_use]
    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    /// Number of visible facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Returns true if the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}
