//! The simulated actor runtime.
//!
//! Actors are registered once as behavior factories; `restart_system`
//! drops all running actors and the next `Start` events re-create them
//! from scratch, so every interleaving begins from identical program
//! state. Handlers communicate observations to invariant checkers through
//! a shared [`Blackboard`] that is cleared on restart.

use crate::dpor::DporScheduler;
use crate::error::EngineError;
use crate::event::Payload;
use crate::runtime::{ActorRuntime, CellRef, Envelope};
use crate::types::ActorName;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An actor's message handler.
pub type Behavior = Box<dyn FnMut(&mut ActorContext<'_>, &Envelope)>;

type BehaviorFactory = Box<dyn Fn() -> Behavior>;

/// Shared observation state for invariant checkers.
///
/// Handlers write through [`ActorContext`]; checkers read a snapshot
/// after each interleaving. Cleared on every system restart.
#[derive(Debug, Default)]
pub struct Blackboard {
    /// Last-write-wins key/value observations.
    pub notes: BTreeMap<String, String>,
    /// Append-only event log.
    pub log: Vec<String>,
}

impl Blackboard {
    fn clear(&mut self) {
        self.notes.clear();
        self.log.clear();
    }
}

/// Handler-side view of the runtime during one delivery.
pub struct ActorContext<'a> {
    name: &'a ActorName,
    sends: Vec<(ActorName, Payload)>,
    board: &'a mut Blackboard,
}

impl ActorContext<'_> {
    /// The actor's own name.
    #[must_use]
    pub fn self_name(&self) -> &ActorName {
        self.name
    }

    /// Send a message; it is reported to the driver when the handler
    /// returns.
    pub fn send(&mut self, receiver: impl Into<ActorName>, payload: Payload) {
        self.sends.push((receiver.into(), payload));
    }

    /// Record a key/value observation (last write wins).
    pub fn note(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.board.notes.insert(key.into(), value.into());
    }

    /// Append an entry to the shared event log.
    pub fn log(&mut self, entry: impl Into<String>) {
        self.board.log.push(entry.into());
    }
}

/// Deterministic, single-threaded in-memory actor runtime.
pub struct SimRuntime {
    factories: BTreeMap<ActorName, BehaviorFactory>,
    running: BTreeMap<ActorName, Behavior>,
    board: Arc<Mutex<Blackboard>>,
}

impl SimRuntime {
    /// Empty runtime with no registered actors.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
            running: BTreeMap::new(),
            board: Arc::new(Mutex::new(Blackboard::default())),
        }
    }

    /// Register an actor definition. `Start` external events spawn fresh
    /// behaviors from the factory.
    pub fn register(
        &mut self,
        name: impl Into<ActorName>,
        factory: impl Fn() -> Behavior + 'static,
    ) {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Handle to the shared observation board (for invariant checkers).
    #[must_use]
    pub fn blackboard(&self) -> Arc<Mutex<Blackboard>> {
        Arc::clone(&self.board)
    }

    /// Snapshot of a note value.
    #[must_use]
    pub fn note(&self, key: &str) -> Option<String> {
        self.board.lock().notes.get(key).cloned()
    }

    /// Snapshot of the event log.
    #[must_use]
    pub fn log(&self) -> Vec<String> {
        self.board.lock().log.clone()
    }
}

impl Default for SimRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRuntime")
            .field("registered", &self.factories.len())
            .field("running", &self.running.len())
            .finish()
    }
}

impl ActorRuntime for SimRuntime {
    fn restart_system(&mut self) {
        self.running.clear();
        self.board.lock().clear();
    }

    fn start_actor(&mut self, name: &ActorName) -> Result<(), EngineError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| EngineError::UnknownActor(name.clone()))?;
        self.running.insert(name.clone(), factory());
        Ok(())
    }

    fn has_actor(&self, name: &ActorName) -> bool {
        self.running.contains_key(name)
    }

    fn deliver(
        &mut self,
        scheduler: &mut DporScheduler,
        cell: &CellRef,
        envelope: &Envelope,
    ) -> Result<(), EngineError> {
        // Deliveries to stopped actors (e.g. partition notifications for
        // actors that never started) are dropped like dead letters.
        let Some(behavior) = self.running.get_mut(&cell.name) else {
            return Ok(());
        };
        let sends = {
            let mut board = self.board.lock();
            let mut ctx = ActorContext {
                name: &cell.name,
                sends: Vec::new(),
                board: &mut board,
            };
            behavior(&mut ctx, envelope);
            ctx.sends
        };
        for (receiver, payload) in sends {
            scheduler.event_produced(
                CellRef::new(receiver),
                Envelope::new(cell.name.clone(), payload),
            )?;
        }
        Ok(())
    }

    fn inject(
        &mut self,
        scheduler: &mut DporScheduler,
        receiver: &ActorName,
        payload: Payload,
    ) -> Result<(), EngineError> {
        scheduler.event_produced(CellRef::new(receiver.clone()), Envelope::external(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn restart_clears_actors_and_board() {
        let mut runtime = SimRuntime::new();
        runtime.register("a", || {
            Box::new(|ctx, _env| {
                ctx.note("seen", "yes");
            })
        });
        let name: ActorName = "a".into();
        runtime.start_actor(&name).expect("registered");
        assert!(runtime.has_actor(&name));

        let mut sched = DporScheduler::new(EngineConfig::default());
        sched.begin_interleaving();
        runtime
            .deliver(
                &mut sched,
                &CellRef::new("a"),
                &Envelope::external(Payload::user(b"hi".as_slice())),
            )
            .expect("deliver");
        assert_eq!(runtime.note("seen").as_deref(), Some("yes"));

        runtime.restart_system();
        assert!(!runtime.has_actor(&name));
        assert_eq!(runtime.note("seen"), None);
    }

    #[test]
    fn unknown_actor_is_a_programmer_error() {
        let mut runtime = SimRuntime::new();
        let err = runtime.start_actor(&"ghost".into()).expect_err("unknown");
        assert!(matches!(err, EngineError::UnknownActor(_)));
    }

    #[test]
    fn handler_sends_reach_the_scheduler() {
        let mut runtime = SimRuntime::new();
        runtime.register("a", || {
            Box::new(|ctx, _env| {
                ctx.send("b", Payload::user(b"fwd".as_slice()));
            })
        });
        runtime.register("b", || Box::new(|_ctx, _env| {}));
        runtime.start_actor(&"a".into()).expect("start a");
        runtime.start_actor(&"b".into()).expect("start b");

        let mut sched = DporScheduler::new(EngineConfig::default());
        sched.begin_interleaving();
        runtime
            .deliver(
                &mut sched,
                &CellRef::new("a"),
                &Envelope::external(Payload::user(b"go".as_slice())),
            )
            .expect("deliver");
        let next = sched.schedule_new_message().expect("schedule");
        let dispatch = next.expect("forwarded send is pending");
        assert_eq!(dispatch.cell.name.as_str(), "b");
    }
}
