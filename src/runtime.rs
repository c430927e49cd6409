//! Contract between the driver and the instrumented actor runtime.
//!
//! The engine never executes actor code itself. It hands envelopes to an
//! [`ActorRuntime`] one at a time and observes the sends the handler
//! performs through [`crate::dpor::DporScheduler::event_produced`]. All
//! calls are serialized: the runtime must not re-enter the scheduler from
//! multiple threads.

use crate::dpor::DporScheduler;
use crate::error::EngineError;
use crate::event::{PartitionEvent, Payload};
use crate::types::ActorName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sender name used for externally injected messages.
#[must_use]
pub fn external_sender() -> ActorName {
    ActorName::new("$external")
}

/// Handle to an actor cell, addressed by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    /// Actor name the cell belongs to.
    pub name: ActorName,
}

impl CellRef {
    /// Handle for the named actor.
    #[must_use]
    pub fn new(name: impl Into<ActorName>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell({})", self.name)
    }
}

/// A message in flight: sender plus payload. The receiver is the cell the
/// envelope is dispatched to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Envelope {
    /// Sending actor.
    pub sender: ActorName,
    /// Message content.
    pub payload: Payload,
}

impl Envelope {
    /// Envelope from a named sender.
    #[must_use]
    pub fn new(sender: impl Into<ActorName>, payload: Payload) -> Self {
        Self {
            sender: sender.into(),
            payload,
        }
    }

    /// Envelope injected from outside the system.
    #[must_use]
    pub fn external(payload: Payload) -> Self {
        Self {
            sender: external_sender(),
            payload,
        }
    }
}

/// Externally injected events accepted by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalEvent {
    /// Spawn the named actor (its definition must be registered with the
    /// runtime).
    Start(ActorName),
    /// Inject a user message.
    Send {
        /// Receiving actor.
        receiver: ActorName,
        /// Message content.
        payload: Payload,
    },
    /// Atomic bidirectional partition between two groups.
    Partition(PartitionEvent),
    /// Barrier: wait until the system is idle before injecting further
    /// external events.
    WaitQuiescence,
}

/// The instrumented runtime as seen by the driver.
///
/// Implementations deliver exactly one envelope per [`deliver`] call and
/// report every send the handler performs back to the scheduler before
/// returning (the `await_enqueue` contract: no in-flight sends survive
/// the call).
///
/// [`deliver`]: ActorRuntime::deliver
pub trait ActorRuntime {
    /// Tear down and re-spawn all actors, clearing program state.
    fn restart_system(&mut self);

    /// Spawn the named actor. Errors if no definition is registered under
    /// that name — a malformed external-event sequence.
    fn start_actor(&mut self, name: &ActorName) -> Result<(), EngineError>;

    /// True if an actor with this name is currently running.
    fn has_actor(&self, name: &ActorName) -> bool;

    /// Deliver exactly one envelope to the given cell, reporting produced
    /// sends via [`DporScheduler::event_produced`].
    fn deliver(
        &mut self,
        scheduler: &mut DporScheduler,
        cell: &CellRef,
        envelope: &Envelope,
    ) -> Result<(), EngineError>;

    /// Perform an external send: route `payload` to `receiver` as if sent
    /// from outside, reporting it via [`DporScheduler::event_produced`].
    fn inject(
        &mut self,
        scheduler: &mut DporScheduler,
        receiver: &ActorName,
        payload: Payload,
    ) -> Result<(), EngineError>;
}
