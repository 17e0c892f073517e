//! Registered reactions and their registry.
//!
//! A reaction binds a compiled pattern to a callback. Reactions declared at
//! program load time are static and persist across epochs; reactions declared
//! inside another reaction's callback are dynamic and are discarded at the
//! start of the next evaluation unless re-declared.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::ProgramScope;
use crate::error::FactLogResult;
use crate::fact::ProgramId;
use crate::matcher::BindingSet;
use crate::pattern::Pattern;

/// Unique identifier for a registered reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionId(Uuid);

impl ReactionId {
    /// Creates a new random reaction id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ReactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a reaction consumes matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    /// Fires once per matching binding set (zero or more times per epoch).
    When,
    /// Fires exactly once per epoch with every binding set, empty included.
    WithAll,
}

/// Callback fired once per matching binding set.
pub type WhenFn = Box<dyn FnMut(&mut ProgramScope<'_>, &BindingSet) -> FactLogResult<()>>;

/// Callback fired once per epoch with all binding sets.
pub type WithAllFn = Box<dyn FnMut(&mut ProgramScope<'_>, &[BindingSet]) -> FactLogResult<()>>;

/// The callback half of a reaction.
pub enum ReactionBody {
    #[allow(missing_docs)]
    When(WhenFn),
    #[allow(missing_docs)]
    WithAll(WithAllFn),
}

impl ReactionBody {
    /// The reaction kind this body implements.
    #[must_use]
    pub const fn kind(&self) -> ReactionKind {
        match self {
            Self::When(_) => ReactionKind::When,
            Self::WithAll(_) => ReactionKind::WithAll,
        }
    }
}

/// A registered reaction.
pub struct Reaction {
    /// Unique id; no two reactions share one.
    pub id: ReactionId,
    /// The program that declared this reaction.
    pub subject: ProgramId,
    /// The compiled pattern the reaction fires on.
    pub pattern: Pattern,
    /// Epoch-scoped reactions are discarded before the next evaluation.
    pub dynamic: bool,
    /// The epoch during which the reaction was registered.
    pub registered_epoch: u64,
    /// The callback.
    pub body: ReactionBody,
}

impl Reaction {
    /// The reaction kind.
    #[must_use]
    pub const fn kind(&self) -> ReactionKind {
        self.body.kind()
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.id)
            .field("subject", &self.subject)
            .field("pattern", &self.pattern.key())
            .field("kind", &self.kind())
            .field("dynamic", &self.dynamic)
            .field("registered_epoch", &self.registered_epoch)
            .finish_non_exhaustive()
    }
}

/// Holds every currently registered reaction in registration order.
#[derive(Debug, Default)]
pub struct ReactionRegistry {
    reactions: Vec<Reaction>,
}

impl ReactionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a reaction.
    pub fn register(&mut self, reaction: Reaction) {
        self.reactions.push(reaction);
    }

    /// Number of registered reactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    /// Returns true if no reactions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }

    /// The reaction at the given registration index.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Reaction> {
        self.reactions.get_mut(index)
    }

    /// Iterates reactions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Reaction> {
        self.reactions.iter()
    }

    /// Drops the previous epoch's dynamic reactions.
    pub fn remove_dynamic(&mut self) {
        self.reactions.retain(|r| !r.dynamic);
    }

    /// Drops every reaction declared by the given program.
    pub fn remove_subject(&mut self, subject: &ProgramId) {
        self.reactions.retain(|r| &r.subject != subject);
    }
}
