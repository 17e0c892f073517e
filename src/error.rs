//! Error types for the fact engine.
//!
//! All errors are strongly typed using thiserror. Pattern errors are fatal to
//! the declaration that produced them and nothing else; no error aborts the
//! engine as a whole.

use thiserror::Error;

use crate::fact::ProgramId;

/// Pattern compilation errors, detected at declaration time rather than at
/// match time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum PatternError {
    #[error("unexpected '{{' inside a placeholder in template '{template}'")]
    UnexpectedOpenBrace { template: String },

    #[error("unexpected '}}' outside a placeholder in template '{template}'")]
    UnexpectedCloseBrace { template: String },

    #[error("unterminated placeholder in template '{template}'")]
    UnterminatedPlaceholder { template: String },

    #[error(
        "template '{template}' has {placeholders} bound placeholder(s) but {supplied} value(s) were supplied"
    )]
    ArityMismatch {
        template: String,
        placeholders: usize,
        supplied: usize,
    },

    #[error("empty clause in template '{template}'")]
    EmptyClause { template: String },

    #[error("free variable '{{{name}}}' is not allowed in an assertion template '{template}'")]
    VariableInAssertion { name: String, template: String },
}

/// Engine lifecycle and internal-invariant errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum EngineError {
    #[error("startup() has already run; static declarations are collected exactly once")]
    AlreadyStarted,

    #[error("tick() called before startup(); static declarations have not been collected")]
    NotStarted,

    #[error("program '{id}' is already registered")]
    DuplicateProgram { id: ProgramId },

    /// Should be unreachable given well-compiled patterns and facts built
    /// through the declaration surface. Surfaced rather than silently ignored.
    #[error("join invariant violated: {message}")]
    JoinInvariant { message: String },
}

/// Top-level error type for the fact engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum FactLogError {
    #[error("pattern error: {0}")]
    Pattern(#[from] PatternError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl FactLogError {
    /// Returns true if this is a pattern compilation error.
    #[must_use]
    pub const fn is_pattern(&self) -> bool {
        matches!(self, Self::Pattern(_))
    }

    /// Returns true if this is an engine error.
    #[must_use]
    pub const fn is_engine(&self) -> bool {
        matches!(self, Self::Engine(_))
    }
}

/// Result type alias for fact engine operations.
pub type FactLogResult<T> = Result<T, FactLogError>;
