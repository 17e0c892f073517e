//! Declaration surface handed to programs and reaction callbacks.

use crate::error::{FactLogResult, PatternError};
use crate::fact::{Fact, ProgramId};
use crate::matcher::BindingSet;
use crate::pattern::Pattern;
use crate::reaction::{Reaction, ReactionBody, ReactionId};
use crate::value::Value;

/// Emissions buffered during one evaluation round.
///
/// Nothing a callback declares touches the store or the registry directly;
/// the scheduler absorbs the frame once the round is over, so every reaction
/// in a round sees the same frozen snapshot.
#[derive(Default)]
pub(crate) struct EpochFrame {
    pub(crate) facts: Vec<Fact>,
    pub(crate) reactions: Vec<Reaction>,
}

/// The declaration surface a program sees.
///
/// A scope is handed to a program's declaration function while static
/// declarations are collected, and to every reaction callback during
/// evaluation. Anything declared through a callback's scope is dynamic: it
/// lives for the current epoch and is discarded before the next evaluation
/// unless re-declared.
///
/// Templates use the pattern DSL: `{name}` is a free variable, `{}` consumes
/// the next value from `params` as a bound constant.
pub struct ProgramScope<'a> {
    frame: &'a mut EpochFrame,
    subject: ProgramId,
    dynamic: bool,
    epoch: u64,
}

impl<'a> ProgramScope<'a> {
    pub(crate) fn new(
        frame: &'a mut EpochFrame,
        subject: ProgramId,
        dynamic: bool,
        epoch: u64,
    ) -> Self {
        Self {
            frame,
            subject,
            dynamic,
            epoch,
        }
    }

    /// The program this scope declares for.
    #[must_use]
    pub fn subject(&self) -> &ProgramId {
        &self.subject
    }

    /// The current epoch.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns true if declarations made through this scope are epoch-scoped.
    #[must_use]
    pub const fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Asserts a fact as currently true.
    ///
    /// The template must contain only literals and `{}` bound placeholders.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] if the template is malformed or contains a
    /// free variable.
    pub fn claim(&mut self, template: &str, params: &[Value]) -> Result<(), PatternError> {
        let (name, args) = Pattern::compile_assertion(template, params)?;
        self.frame
            .facts
            .push(Fact::claim(self.subject.clone(), name, args));
        Ok(())
    }

    /// Requests a fact to be made true by some other program or the platform.
    ///
    /// Stored so that `{someone} wishes ...` patterns join against it, with
    /// this scope's program bound as the wisher.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] if the template is malformed or contains a
    /// free variable.
    pub fn wish(&mut self, template: &str, params: &[Value]) -> Result<(), PatternError> {
        let (name, args) = Pattern::compile_assertion(template, params)?;
        self.frame
            .facts
            .push(Fact::wish(self.subject.clone(), name, args));
        Ok(())
    }

    /// Registers a reaction firing once per matching binding set.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] if the template does not compile.
    pub fn when<F>(&mut self, template: &str, params: &[Value], callback: F) -> Result<(), PatternError>
    where
        F: FnMut(&mut ProgramScope<'_>, &BindingSet) -> FactLogResult<()> + 'static,
    {
        let pattern = Pattern::compile(template, params)?;
        self.frame.reactions.push(Reaction {
            id: ReactionId::new(),
            subject: self.subject.clone(),
            pattern,
            dynamic: self.dynamic,
            registered_epoch: self.epoch,
            body: ReactionBody::When(Box::new(callback)),
        });
        Ok(())
    }

    /// Registers a reaction firing exactly once per epoch with every matching
    /// binding set, the empty case included.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] if the template does not compile.
    pub fn with_all<F>(
        &mut self,
        template: &str,
        params: &[Value],
        callback: F,
    ) -> Result<(), PatternError>
    where
        F: FnMut(&mut ProgramScope<'_>, &[BindingSet]) -> FactLogResult<()> + 'static,
    {
        let pattern = Pattern::compile(template, params)?;
        self.frame.reactions.push(Reaction {
            id: ReactionId::new(),
            subject: self.subject.clone(),
            pattern,
            dynamic: self.dynamic,
            registered_epoch: self.epoch,
            body: ReactionBody::WithAll(Box::new(callback)),
        });
        Ok(())
    }
}
