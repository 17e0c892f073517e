//! Pattern templates compiled from the literal/placeholder DSL.
//!
//! A pattern is an ordered sequence of clauses joined conjunctively. Each
//! clause is a claim shape whose argument slots are either bound constants or
//! named free variables:
//!
//! - `{name}` declares a free variable capturing the corresponding fact field;
//! - `{}` is a bound placeholder consuming the next interpolated value from
//!   `params`, which a matching fact field must equal exactly;
//! - `,` separates clauses.
//!
//! Compilation is a pure parser producing a tagged AST; all malformed
//! templates are rejected here, never at match time. The same free variable
//! repeated inside one clause is legal and constrains the corresponding fields
//! to be equal.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PatternError;
use crate::value::Value;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex literal"));

fn normalize_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").into_owned()
}

/// One argument slot of a clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Term {
    /// Must equal this value in any matching fact.
    Constant {
        /// The expected value.
        value: Value,
    },
    /// Captures the corresponding fact field under this name.
    Variable {
        /// The capture name.
        name: String,
    },
}

impl Term {
    /// Creates a constant term.
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant {
            value: value.into(),
        }
    }

    /// Creates a free-variable term.
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable { name: name.into() }
    }

    /// Returns true if this term is a bound constant.
    #[must_use]
    pub const fn is_constant(&self) -> bool {
        matches!(self, Self::Constant { .. })
    }

    /// Returns true if this term is a free variable.
    #[must_use]
    pub const fn is_variable(&self) -> bool {
        matches!(self, Self::Variable { .. })
    }
}

/// A single claim shape inside a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    /// Normalized claim name with `@` markers where the terms sit.
    pub name: String,
    /// Argument slots in order, one per `@` marker.
    pub terms: Vec<Term>,
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut terms = self.terms.iter();
        for ch in self.name.chars() {
            if ch == '@' {
                match terms.next() {
                    Some(Term::Constant { value }) => write!(f, "{value}")?,
                    Some(Term::Variable { name }) => write!(f, "{{{name}}}")?,
                    None => write!(f, "@")?,
                }
            } else {
                write!(f, "{ch}")?;
            }
        }
        Ok(())
    }
}

/// A compiled pattern: one or more clauses joined conjunctively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    clauses: Vec<Clause>,
    key: String,
}

impl Pattern {
    /// Compiles a template and its interpolated values into a pattern.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] for unbalanced or nested braces, an
    /// interpolation arity mismatch, or an empty clause.
    ///
    /// # Examples
    ///
    /// ```
    /// use factlog::{Pattern, Value};
    ///
    /// let p = Pattern::compile(
    ///     "{someone} wishes {} loads js library from {url}",
    ///     &[Value::from("system")],
    /// )
    /// .unwrap();
    /// assert_eq!(p.clauses().len(), 1);
    /// ```
    pub fn compile(template: &str, params: &[Value]) -> Result<Self, PatternError> {
        let normalized = normalize_whitespace(template);
        let placeholders = scan_template(template, &normalized)?;
        if placeholders != params.len() {
            return Err(PatternError::ArityMismatch {
                template: template.to_string(),
                placeholders,
                supplied: params.len(),
            });
        }

        let mut clauses = Vec::new();
        let mut name = String::new();
        let mut terms = Vec::new();
        let mut buffer = String::new();
        let mut inside = false;
        let mut next_param = 0;

        for ch in normalized.chars() {
            match ch {
                '{' => {
                    inside = true;
                    buffer.clear();
                }
                '}' => {
                    inside = false;
                    let var = buffer.trim();
                    if var.is_empty() {
                        terms.push(Term::constant(params[next_param].clone()));
                        next_param += 1;
                    } else {
                        terms.push(Term::variable(var));
                    }
                    name.push('@');
                }
                ',' if !inside => {
                    push_clause(&mut clauses, &mut name, &mut terms, template)?;
                }
                _ => {
                    if inside {
                        buffer.push(ch);
                    } else {
                        name.push(ch);
                    }
                }
            }
        }

        push_clause(&mut clauses, &mut name, &mut terms, template)?;

        let key = clauses
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        Ok(Self { clauses, key })
    }

    /// Compiles a constants-only assertion template into a fact name and its
    /// argument values.
    ///
    /// Unlike [`Pattern::compile`], commas are literal name text here (an
    /// assertion is always a single fact) and free variables are rejected.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] for malformed braces, an arity mismatch, a
    /// free variable, or an empty name.
    pub fn compile_assertion(
        template: &str,
        params: &[Value],
    ) -> Result<(String, Vec<Value>), PatternError> {
        let normalized = normalize_whitespace(template);
        let placeholders = scan_template(template, &normalized)?;
        if placeholders != params.len() {
            return Err(PatternError::ArityMismatch {
                template: template.to_string(),
                placeholders,
                supplied: params.len(),
            });
        }

        let mut name = String::new();
        let mut args = Vec::new();
        let mut buffer = String::new();
        let mut inside = false;
        let mut next_param = 0;

        for ch in normalized.chars() {
            match ch {
                '{' => {
                    inside = true;
                    buffer.clear();
                }
                '}' => {
                    inside = false;
                    let var = buffer.trim();
                    if !var.is_empty() {
                        return Err(PatternError::VariableInAssertion {
                            name: var.to_string(),
                            template: template.to_string(),
                        });
                    }
                    args.push(params[next_param].clone());
                    next_param += 1;
                    name.push('@');
                }
                _ => {
                    if inside {
                        buffer.push(ch);
                    } else {
                        name.push(ch);
                    }
                }
            }
        }

        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(PatternError::EmptyClause {
                template: template.to_string(),
            });
        }

        Ok((name, args))
    }

    /// The compiled clauses in declaration order.
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Canonical text identity of this pattern.
    ///
    /// Two compilations of the same template with equal parameters produce
    /// the same key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Validates brace structure and counts `{}` bound placeholders.
fn scan_template(template: &str, normalized: &str) -> Result<usize, PatternError> {
    let mut inside = false;
    let mut buffer = String::new();
    let mut placeholders = 0;

    for ch in normalized.chars() {
        match ch {
            '{' => {
                if inside {
                    return Err(PatternError::UnexpectedOpenBrace {
                        template: template.to_string(),
                    });
                }
                inside = true;
                buffer.clear();
            }
            '}' => {
                if !inside {
                    return Err(PatternError::UnexpectedCloseBrace {
                        template: template.to_string(),
                    });
                }
                inside = false;
                if buffer.trim().is_empty() {
                    placeholders += 1;
                }
            }
            _ => {
                if inside {
                    buffer.push(ch);
                }
            }
        }
    }

    if inside {
        return Err(PatternError::UnterminatedPlaceholder {
            template: template.to_string(),
        });
    }

    Ok(placeholders)
}

fn push_clause(
    clauses: &mut Vec<Clause>,
    name: &mut String,
    terms: &mut Vec<Term>,
    template: &str,
) -> Result<(), PatternError> {
    let trimmed = name.trim().to_string();
    if trimmed.is_empty() {
        return Err(PatternError::EmptyClause {
            template: template.to_string(),
        });
    }
    clauses.push(Clause {
        name: trimmed,
        terms: std::mem::take(terms),
    });
    name.clear();
    Ok(())
}
