//! The epoch scheduler.
//!
//! The engine owns the fact store, the reaction registry and the set of
//! loaded programs, and advances the world one epoch at a time. Every tick
//! discards the previous epoch's dynamic facts and reactions, evaluates each
//! registered reaction against a frozen snapshot, drains nested dynamic
//! registrations in follow-up rounds, and publishes the reconciled state as
//! an [`EpochReport`].
//!
//! Failures never propagate across programs: a callback that errors or
//! panics is reported through [`Diagnostics`](crate::diagnostics::Diagnostics)
//! and the epoch carries on.

mod scope;

pub use scope::ProgramScope;
pub(crate) use scope::EpochFrame;

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diagnostics::{DiagnosticEvent, DiagnosticKind, DiagnosticStream, Diagnostics};
use crate::error::{EngineError, FactLogResult};
use crate::fact::{Fact, FactKind, ProgramId};
use crate::matcher::{match_pattern, BindingSet};
use crate::pattern::Pattern;
use crate::reaction::{ReactionBody, ReactionRegistry};
use crate::store::{FactStore, Snapshot};
use crate::value::Value;

/// A program's declaration code, run once when the program is collected.
pub type DeclarationFn = Box<dyn FnMut(&mut ProgramScope<'_>) -> FactLogResult<()>>;

/// Where the scheduler currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Between ticks, or before startup.
    Idle,
    /// Running program declaration code during startup.
    CollectingStatic,
    /// Evaluating reactions against snapshots.
    Evaluating,
    /// Publishing the epoch's reconciled state.
    Reconciling,
}

/// Tunables for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum nested dynamic-registration rounds drained per epoch. A chain
    /// deeper than this is cut off with a
    /// [`DepthLimitReached`](DiagnosticKind::DepthLimitReached) diagnostic.
    pub max_dynamic_depth: usize,
    /// Per-subscriber diagnostics buffer size.
    pub diagnostics_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_dynamic_depth: 8,
            diagnostics_capacity: 1024,
        }
    }
}

/// The reconciled state published at the end of a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    /// The epoch this report reconciles.
    pub epoch: u64,
    /// When the tick started.
    pub started_at: DateTime<Utc>,
    /// Every claim visible after reconciliation, superseded writes collapsed.
    pub claims: Vec<Fact>,
    /// Every wish visible after reconciliation.
    pub wishes: Vec<Fact>,
}

impl EpochReport {
    /// The claims carrying the given normalized name.
    pub fn claims_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Fact> {
        self.claims.iter().filter(move |f| f.name == name)
    }

    /// The wishes carrying the given normalized name.
    pub fn wishes_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Fact> {
        self.wishes.iter().filter(move |f| f.name == name)
    }
}

struct ProgramEntry {
    id: ProgramId,
    declaration: DeclarationFn,
    collected: bool,
}

/// The reactive fact engine.
pub struct Engine {
    config: EngineConfig,
    programs: Vec<ProgramEntry>,
    store: FactStore,
    registry: ReactionRegistry,
    diagnostics: Diagnostics,
    epoch: u64,
    phase: Phase,
    started: bool,
    pending_removals: Vec<ProgramId>,
}

impl Engine {
    /// Creates an engine with the given configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            programs: Vec::new(),
            store: FactStore::new(),
            registry: ReactionRegistry::new(),
            diagnostics: Diagnostics::new(config.diagnostics_capacity),
            epoch: 0,
            phase: Phase::Idle,
            started: false,
            pending_removals: Vec::new(),
        }
    }

    /// The current scheduler phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// The most recently started epoch (0 before the first tick).
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Registers a diagnostics subscriber.
    pub fn subscribe_diagnostics(&mut self) -> DiagnosticStream {
        self.diagnostics.subscribe()
    }

    /// Number of diagnostic events dropped on full subscriber buffers.
    #[must_use]
    pub fn dropped_diagnostics(&self) -> u64 {
        self.diagnostics.dropped_events()
    }

    /// Loads a program.
    ///
    /// Before [`startup`](Self::startup) the declaration runs during startup;
    /// afterwards it runs at the start of the next tick. Either way its
    /// claims, wishes and reactions are static.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateProgram`] if a program with this id is
    /// already loaded.
    pub fn add_program<F>(&mut self, id: ProgramId, declaration: F) -> FactLogResult<()>
    where
        F: FnMut(&mut ProgramScope<'_>) -> FactLogResult<()> + 'static,
    {
        if self.programs.iter().any(|p| p.id == id) {
            return Err(EngineError::DuplicateProgram { id }.into());
        }
        self.programs.push(ProgramEntry {
            id,
            declaration: Box::new(declaration),
            collected: false,
        });
        Ok(())
    }

    /// Unloads a program at the next epoch boundary.
    ///
    /// All of its facts and reactions are removed before the next evaluation;
    /// nothing is interrupted mid-epoch.
    pub fn remove_program(&mut self, id: ProgramId) {
        self.pending_removals.push(id);
    }

    /// Publishes an externally sourced claim, e.g. from a sensor feed.
    ///
    /// The claim persists across epochs until superseded by a later write to
    /// the same `(subject, name)`.
    ///
    /// # Errors
    ///
    /// Returns a pattern error if the template is malformed or contains a
    /// free variable.
    pub fn inject_claim(
        &mut self,
        subject: ProgramId,
        template: &str,
        params: &[Value],
    ) -> FactLogResult<()> {
        let (name, args) = Pattern::compile_assertion(template, params)?;
        self.store.insert(Fact::claim(subject, name, args), false);
        Ok(())
    }

    /// Queries the current store state directly, outside any reaction.
    ///
    /// # Errors
    ///
    /// Returns a pattern error if the template does not compile, or an engine
    /// error if a stored fact violates the arity invariant.
    pub fn query(&self, template: &str, params: &[Value]) -> FactLogResult<Vec<BindingSet>> {
        let pattern = Pattern::compile(template, params)?;
        Ok(match_pattern(&pattern, &self.store.snapshot())?)
    }

    /// Runs every loaded program's declaration code and registers the static
    /// facts and reactions they produce.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyStarted`] on a second call. A failing
    /// program is reported through diagnostics and does not fail startup.
    pub fn startup(&mut self) -> FactLogResult<()> {
        if self.started {
            return Err(EngineError::AlreadyStarted.into());
        }
        self.phase = Phase::CollectingStatic;
        self.collect_programs();
        self.phase = Phase::Idle;
        self.started = true;
        debug!(programs = self.programs.len(), "engine started");
        Ok(())
    }

    /// Advances the world by one epoch and publishes the reconciled state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotStarted`] before [`startup`](Self::startup).
    /// Program and callback failures never fail the tick; they are reported
    /// through diagnostics.
    pub fn tick(&mut self) -> FactLogResult<EpochReport> {
        if !self.started {
            return Err(EngineError::NotStarted.into());
        }

        self.epoch += 1;
        let started_at = Utc::now();
        self.phase = Phase::Evaluating;

        // Epoch boundary: programs loaded since the last tick come in as
        // static, queued removals apply, and the previous epoch's dynamic
        // state is discarded.
        self.collect_programs();
        for id in std::mem::take(&mut self.pending_removals) {
            self.registry.remove_subject(&id);
            self.store.remove_subject(&id);
            self.programs.retain(|p| p.id != id);
        }
        self.registry.remove_dynamic();
        self.store.clear_dynamic();

        let mut snapshot = self.store.snapshot();
        let mut cursor = 0;
        let mut rounds = 0;

        // Round 0 runs the static reactions against the epoch-start snapshot.
        // Each follow-up round runs only the reactions registered by the
        // previous one, against a snapshot refreshed with this epoch's
        // assertions.
        loop {
            let end = self.registry.len();
            if cursor >= end {
                break;
            }
            if rounds > self.config.max_dynamic_depth {
                self.diagnostics.emit(DiagnosticEvent::now(
                    self.epoch,
                    DiagnosticKind::DepthLimitReached {
                        epoch: self.epoch,
                        depth: self.config.max_dynamic_depth,
                    },
                ));
                break;
            }

            let mut frame = EpochFrame::default();
            self.run_round(cursor, end, &snapshot, &mut frame);
            cursor = end;
            rounds += 1;

            let asserted = !frame.facts.is_empty();
            self.absorb_frame(frame, true);
            if asserted {
                snapshot = self.store.snapshot();
            }
        }

        self.phase = Phase::Reconciling;
        let report = self.publish(started_at);
        self.phase = Phase::Idle;
        debug!(
            epoch = report.epoch,
            rounds,
            claims = report.claims.len(),
            wishes = report.wishes.len(),
            "epoch reconciled"
        );
        Ok(report)
    }

    /// Runs the declaration code of every not-yet-collected program.
    fn collect_programs(&mut self) {
        let epoch = self.epoch;
        let mut frame = EpochFrame::default();
        for entry in &mut self.programs {
            if entry.collected {
                continue;
            }
            entry.collected = true;

            let mut scope = ProgramScope::new(&mut frame, entry.id.clone(), false, epoch);
            let outcome = catch_unwind(AssertUnwindSafe(|| (entry.declaration)(&mut scope)));
            if let Some(message) = failure_message(outcome) {
                self.diagnostics.emit(DiagnosticEvent::now(
                    epoch,
                    DiagnosticKind::ProgramFailure {
                        subject: entry.id.clone(),
                        message,
                    },
                ));
            }
        }
        self.absorb_frame(frame, false);
    }

    /// Evaluates the reactions at registry indices `start..end` against one
    /// frozen snapshot, buffering everything they declare into `frame`.
    fn run_round(
        &mut self,
        start: usize,
        end: usize,
        snapshot: &Snapshot,
        frame: &mut EpochFrame,
    ) {
        let epoch = self.epoch;
        for index in start..end {
            let Some(reaction) = self.registry.get_mut(index) else {
                break;
            };
            let id = reaction.id;
            let subject = reaction.subject.clone();

            let sets = match match_pattern(&reaction.pattern, snapshot) {
                Ok(sets) => sets,
                Err(err) => {
                    self.diagnostics.emit(DiagnosticEvent::now(
                        epoch,
                        DiagnosticKind::JoinInvariant {
                            reaction: id,
                            message: err.to_string(),
                        },
                    ));
                    continue;
                }
            };

            match &mut reaction.body {
                ReactionBody::When(callback) => {
                    for bindings in &sets {
                        let mut scope =
                            ProgramScope::new(&mut *frame, subject.clone(), true, epoch);
                        let outcome =
                            catch_unwind(AssertUnwindSafe(|| callback(&mut scope, bindings)));
                        if let Some(message) = failure_message(outcome) {
                            self.diagnostics.emit(DiagnosticEvent::now(
                                epoch,
                                DiagnosticKind::CallbackFailure {
                                    reaction: id,
                                    subject: subject.clone(),
                                    bindings: bindings.clone(),
                                    message,
                                },
                            ));
                        }
                    }
                }
                ReactionBody::WithAll(callback) => {
                    let mut scope = ProgramScope::new(&mut *frame, subject.clone(), true, epoch);
                    let outcome = catch_unwind(AssertUnwindSafe(|| callback(&mut scope, &sets)));
                    if let Some(message) = failure_message(outcome) {
                        self.diagnostics.emit(DiagnosticEvent::now(
                            epoch,
                            DiagnosticKind::CallbackFailure {
                                reaction: id,
                                subject: subject.clone(),
                                bindings: BindingSet::new(),
                                message,
                            },
                        ));
                    }
                }
            }
        }
    }

    /// Moves a round's buffered declarations into the store and the registry.
    /// `facts_dynamic` tags the facts; reactions carry their own tagging from
    /// the scope that declared them.
    fn absorb_frame(&mut self, frame: EpochFrame, facts_dynamic: bool) {
        for fact in frame.facts {
            self.store.insert(fact, facts_dynamic);
        }
        for reaction in frame.reactions {
            self.registry.register(reaction);
        }
    }

    fn publish(&self, started_at: DateTime<Utc>) -> EpochReport {
        let snapshot = self.store.snapshot();
        let mut claims = Vec::new();
        let mut wishes = Vec::new();
        for fact in snapshot.facts() {
            match fact.kind {
                FactKind::Claim => claims.push(fact.clone()),
                FactKind::Wish => wishes.push(fact.clone()),
            }
        }
        EpochReport {
            epoch: self.epoch,
            started_at,
            claims,
            wishes,
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn failure_message(outcome: Result<FactLogResult<()>, Box<dyn Any + Send>>) -> Option<String> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err.to_string()),
        Err(panic) => Some(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}
