//! Diagnostic channel for callback and scheduler failures.
//!
//! A misbehaving program degrades to "its reactions stop firing usefully";
//! nothing here aborts an epoch. Failures are surfaced to subscribers over a
//! bounded channel with `try_send` semantics - the engine never blocks on a
//! slow consumer, it counts the drop and moves on. Every event is also logged
//! via `tracing`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fact::ProgramId;
use crate::matcher::BindingSet;
use crate::reaction::ReactionId;

/// What went wrong.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A reaction callback failed or panicked; the epoch continued without it.
    CallbackFailure {
        /// The reaction whose callback failed.
        reaction: ReactionId,
        /// The program that declared the reaction.
        subject: ProgramId,
        /// The binding set that triggered the callback (empty for `WithAll`).
        bindings: BindingSet,
        /// Panic or error message.
        message: String,
    },

    /// A program's declaration code failed or panicked while being collected.
    ProgramFailure {
        /// The failing program.
        subject: ProgramId,
        /// Panic or error message.
        message: String,
    },

    /// Nested dynamic registration exceeded the configured depth bound.
    DepthLimitReached {
        /// The epoch that hit the bound.
        epoch: u64,
        /// The configured maximum depth.
        depth: usize,
    },

    /// A stored fact disagreed with its own name arity (internal invariant).
    JoinInvariant {
        /// The reaction whose match hit the invariant.
        reaction: ReactionId,
        /// Details of the disagreement.
        message: String,
    },
}

/// A timestamped diagnostic event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    /// When the event was produced.
    pub at: DateTime<Utc>,
    /// The epoch during which it happened.
    pub epoch: u64,
    /// The failure itself.
    pub kind: DiagnosticKind,
}

impl DiagnosticEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn now(epoch: u64, kind: DiagnosticKind) -> Self {
        Self {
            at: Utc::now(),
            epoch,
            kind,
        }
    }
}

/// Bounded, non-blocking diagnostics fan-out.
#[derive(Debug)]
pub struct Diagnostics {
    capacity: usize,
    senders: Vec<Sender<DiagnosticEvent>>,
    dropped: Arc<AtomicU64>,
}

impl Diagnostics {
    /// Creates a fan-out whose per-subscriber buffer holds `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            senders: Vec::new(),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers a subscriber and returns its stream.
    pub fn subscribe(&mut self) -> DiagnosticStream {
        let (tx, rx) = bounded(self.capacity);
        self.senders.push(tx);
        DiagnosticStream { rx }
    }

    /// Publishes an event to every live subscriber.
    pub fn emit(&mut self, event: DiagnosticEvent) {
        warn!(epoch = event.epoch, kind = ?event.kind, "engine diagnostic");

        let dropped = &self.dropped;
        self.senders.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Number of events dropped because a subscriber buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// A subscription stream for diagnostic events.
#[derive(Debug)]
pub struct DiagnosticStream {
    rx: Receiver<DiagnosticEvent>,
}

impl DiagnosticStream {
    /// Receives the next event without blocking.
    #[must_use]
    pub fn try_recv(&self) -> Option<DiagnosticEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Receives the next event, waiting up to `timeout`.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<DiagnosticEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Drains every event currently buffered.
    #[must_use]
    pub fn drain(&self) -> Vec<DiagnosticEvent> {
        let mut out = Vec::new();
        while let Some(event) = self.try_recv() {
            out.push(event);
        }
        out
    }
}
