//! Fact records published by programs.
//!
//! A fact is a typed record `(kind, subject, name, args)`. The `name` is the
//! normalized template text with `@` markers where the arguments sit, e.g.
//! `"@ has corner points @"`. Claims state something the subject holds true;
//! wishes request that some other program or the platform make it true. Both
//! are stored identically and both are visible to the matcher.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Whether a fact asserts state (`Claim`) or requests it (`Wish`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    /// An assertion that something is currently true.
    Claim,
    /// A request for some other program to make something true.
    Wish,
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Claim => write!(f, "claim"),
            Self::Wish => write!(f, "wish"),
        }
    }
}

/// Identifier of the program a fact belongs to.
///
/// In the camera setup this is the recognized paper number; platform-level
/// feeds and handlers use [`ProgramId::system`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgramId(String);

impl ProgramId {
    /// Creates a program id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identity used by the platform itself (clock, loaders, renderers).
    #[must_use]
    pub fn system() -> Self {
        Self("system".to_string())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProgramId {
    fn from(v: &str) -> Self {
        Self::new(v)
    }
}

impl From<String> for ProgramId {
    fn from(v: String) -> Self {
        Self(v)
    }
}

impl From<&ProgramId> for Value {
    fn from(v: &ProgramId) -> Self {
        Self::Text(v.0.clone())
    }
}

impl From<ProgramId> for Value {
    fn from(v: ProgramId) -> Self {
        Self::Text(v.0)
    }
}

/// An immutable fact record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Asserted state or requested state.
    pub kind: FactKind,
    /// The program that published this fact.
    pub subject: ProgramId,
    /// Normalized name with `@` argument markers.
    pub name: String,
    /// Argument values, one per `@` marker.
    pub args: Vec<Value>,
}

impl Fact {
    /// Builds a claim.
    pub fn claim(subject: ProgramId, name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            kind: FactKind::Claim,
            subject,
            name: name.into(),
            args,
        }
    }

    /// Builds the stored form of a wish.
    ///
    /// The wishing program becomes the first argument and the name gains the
    /// `@ wishes ` prefix, so patterns like
    /// `{someone} wishes {paper} has outline` join against it.
    pub fn wish(subject: ProgramId, name: impl Into<String>, args: Vec<Value>) -> Self {
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(Value::from(&subject));
        full_args.extend(args);
        Self {
            kind: FactKind::Wish,
            subject,
            name: format!("@ wishes {}", name.into()),
            args: full_args,
        }
    }
}

impl fmt::Display for Fact {
    /// Renders the fact with its argument values substituted back into the
    /// `@` markers, for logs and diagnostics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut args = self.args.iter();
        for ch in self.name.chars() {
            if ch == '@' {
                match args.next() {
                    Some(arg) => write!(f, "{arg}")?,
                    None => write!(f, "@")?,
                }
            } else {
                write!(f, "{ch}")?;
            }
        }
        Ok(())
    }
}
