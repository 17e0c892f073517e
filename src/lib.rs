//! factlog: a reactive fact engine for cooperating paper programs.
//!
//! Programs publish facts into one shared store and react to patterns over
//! it. A fact is either a *claim* (an assertion that something is true) or a
//! *wish* (a request for some other program to make it true). The engine
//! advances in discrete epochs: every tick it discards the previous epoch's
//! dynamic state, re-evaluates every registered reaction against a frozen
//! snapshot, and publishes the reconciled set of claims and wishes.
//!
//! # Core concepts
//!
//! - [`Fact`]: a `(kind, subject, name, args)` record. Names are normalized
//!   templates with one `@` marker per argument.
//! - [`Pattern`]: a compiled query template. `{name}` binds a free variable,
//!   `{}` consumes the next supplied value as a constant, and `,` separates
//!   clauses joined conjunctively.
//! - [`ProgramScope`]: the declaration surface handed to program code, with
//!   `claim`, `wish`, `when` and `with_all`.
//! - [`Engine`]: the epoch scheduler. Static declarations are collected once
//!   at [`Engine::startup`]; everything declared inside a reaction callback
//!   lives only until the next [`Engine::tick`].
//!
//! # Example
//!
//! ```rust,ignore
//! use factlog::{Engine, ProgramId, Value};
//!
//! let mut engine = Engine::default();
//! engine.add_program(ProgramId::new("7"), |scope| {
//!     scope.claim("{} has width {}", &[Value::from("7"), Value::from(100.0)])?;
//!     scope.when("{p} has width {w}", &[], |inner, bindings| {
//!         inner.wish("{} is highlighted", &[bindings["p"].clone()])?;
//!         Ok(())
//!     })?;
//!     Ok(())
//! })?;
//! engine.startup()?;
//! let report = engine.tick()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod fact;
pub mod matcher;
pub mod pattern;
pub mod reaction;
pub mod store;
pub mod value;

pub use diagnostics::{DiagnosticEvent, DiagnosticKind, DiagnosticStream, Diagnostics};
pub use engine::{DeclarationFn, Engine, EngineConfig, EpochReport, Phase, ProgramScope};
pub use error::{EngineError, FactLogError, FactLogResult, PatternError};
pub use fact::{Fact, FactKind, ProgramId};
pub use matcher::{match_pattern, BindingSet};
pub use pattern::{Clause, Pattern, Term};
pub use reaction::{Reaction, ReactionBody, ReactionId, ReactionKind, ReactionRegistry};
pub use store::{FactStore, Snapshot, StoredFact};
pub use value::{HandleId, Point, Value};
