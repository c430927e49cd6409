//! Engine error taxonomy.
//!
//! Fatal conditions are the exception here, not the rule. Replay
//! divergence, timer cancellation after delivery, and budget exhaustion
//! are expected operating conditions and surface through statistics, not
//! through this module. What remains is:
//!
//! - **Internal invariant violations**: unreachable by construction;
//!   reaching one means the driver itself is buggy. The search aborts
//!   with a structured report naming the invariant.
//! - **Programmer errors**: malformed external-event sequences, such as
//!   starting an actor the runtime has no definition for.
//! - **Trace-file errors**: I/O and schema problems when persisting or
//!   loading trace logs.

use crate::types::ActorName;
use thiserror::Error;

/// Names of internal invariants the driver enforces at runtime.
///
/// Carried inside [`EngineError::InvariantViolation`] so failure reports
/// identify the exact check that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineInvariant {
    /// The parent-event cursor must always point at a message node.
    ParentIsMessage,
    /// A pending-event entry had an unexpected shape for its lane.
    PendingEventShape,
    /// A graph node's path to the root was missing or cyclic.
    PathToRoot,
    /// A unique id appeared on more than one pending lane.
    DuplicatePendingId,
}

impl EngineInvariant {
    /// Stable, grep-friendly invariant name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ParentIsMessage => "parent_is_message",
            Self::PendingEventShape => "pending_event_shape",
            Self::PathToRoot => "path_to_root",
            Self::DuplicatePendingId => "duplicate_pending_id",
        }
    }
}

impl std::fmt::Display for EngineInvariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fatal engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An internal invariant was violated; the search state is unsound
    /// and exploration aborts.
    #[error("internal invariant violated: {invariant} ({detail})")]
    InvariantViolation {
        /// Which invariant fired.
        invariant: EngineInvariant,
        /// Context for the failure report.
        detail: String,
    },

    /// An external event referenced an actor the runtime cannot start.
    #[error("unknown actor in external events: {0}")]
    UnknownActor(ActorName),
}

impl EngineError {
    /// Construct an invariant-violation error.
    #[must_use]
    pub fn invariant(invariant: EngineInvariant, detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            invariant,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_report_names_the_check() {
        let err = EngineError::invariant(EngineInvariant::PathToRoot, "node e7");
        let msg = err.to_string();
        assert!(msg.contains("path_to_root"));
        assert!(msg.contains("e7"));
    }
}
