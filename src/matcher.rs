//! Conjunctive pattern matching over a fact snapshot.
//!
//! Multi-clause patterns are matched left to right as a nested-loop join
//! with early rejection: each clause filters the snapshot by name, by its
//! constant terms, and by variables bound in earlier clauses, then extends
//! the candidate bindings. Exploring every join-consistent combination is a
//! correctness requirement, not an optimization: a variable bound in clause 1
//! may legally filter which facts clause 2 accepts.
//!
//! Binding sets come out in snapshot (insertion) order, so programs relying
//! on "first match wins" behave reproducibly.

use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::pattern::{Clause, Pattern, Term};
use crate::store::Snapshot;
use crate::value::Value;

/// The variable-to-value assignment produced by a successful match.
///
/// Ordered so iteration and serialization are deterministic.
pub type BindingSet = BTreeMap<String, Value>;

/// Matches a pattern against a snapshot, producing every consistent binding
/// set.
///
/// # Errors
///
/// Returns [`EngineError::JoinInvariant`] if a stored fact disagrees with its
/// own name arity - unreachable for facts built through the declaration
/// surface.
pub fn match_pattern(
    pattern: &Pattern,
    snapshot: &Snapshot,
) -> Result<Vec<BindingSet>, EngineError> {
    let mut matches = vec![BindingSet::new()];

    for clause in pattern.clauses() {
        let mut joined = Vec::new();
        for context in &matches {
            matches_for_clause(clause, snapshot, context, &mut joined)?;
        }
        matches = joined;

        if matches.is_empty() {
            return Ok(Vec::new());
        }
    }

    Ok(matches)
}

fn matches_for_clause(
    clause: &Clause,
    snapshot: &Snapshot,
    context: &BindingSet,
    out: &mut Vec<BindingSet>,
) -> Result<(), EngineError> {
    'facts: for fact in snapshot.facts() {
        if fact.name != clause.name {
            continue;
        }
        if fact.args.len() != clause.terms.len() {
            return Err(EngineError::JoinInvariant {
                message: format!(
                    "fact '{}' carries {} argument(s) but its name declares {}",
                    fact.name,
                    fact.args.len(),
                    clause.terms.len()
                ),
            });
        }

        let mut candidate = context.clone();
        for (term, field) in clause.terms.iter().zip(&fact.args) {
            match term {
                Term::Constant { value } => {
                    if value != field {
                        continue 'facts;
                    }
                }
                Term::Variable { name } => match candidate.get(name) {
                    // A variable bound earlier (previous clause, or an
                    // earlier slot of this clause) must agree exactly.
                    Some(bound) => {
                        if bound != field {
                            continue 'facts;
                        }
                    }
                    None => {
                        candidate.insert(name.clone(), field.clone());
                    }
                },
            }
        }

        out.push(candidate);
    }

    Ok(())
}
