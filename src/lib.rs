//! Stateless model checking for message-passing programs.
//!
//! actorlab drives an instrumented actor runtime through distinct
//! interleavings of concurrent message deliveries, using dynamic
//! partial-order reduction (DPOR) to skip schedules equivalent under the
//! happens-before relation. When a run violates a user invariant, the
//! clock-cluster minimizer shrinks the trace while the violation still
//! reproduces.
//!
//! # Architecture
//!
//! - [`dpor::DporScheduler`] — the driver state machine: consumes a
//!   replay prefix, dispatches envelopes, detects races, schedules
//!   backtrack points.
//! - [`oracle::Explorer`] — the outer loop: restart, inject external
//!   events, run to quiescence, check the invariant, repeat.
//! - [`minimize::ClockClusterizer`] — shrinks violating traces by
//!   removing clock clusters and timers, replaying candidates through a
//!   [`oracle::TestOracle`].
//! - [`lab::SimRuntime`] — a deterministic in-memory actor runtime
//!   implementing the [`runtime::ActorRuntime`] contract for harnesses.
//!
//! # Example
//!
//! ```ignore
//! use actorlab::config::EngineConfig;
//! use actorlab::event::Payload;
//! use actorlab::lab::SimRuntime;
//! use actorlab::oracle::{ExplorationOutcome, Explorer};
//! use actorlab::runtime::ExternalEvent;
//!
//! let mut runtime = SimRuntime::new();
//! runtime.register("a", || Box::new(|ctx, _env| {
//!     ctx.send("c", Payload::user(b"m1".as_slice()));
//!     ctx.send("c", Payload::user(b"m2".as_slice()));
//! }));
//! runtime.register("c", || Box::new(|_ctx, _env| {}));
//!
//! let externals = vec![
//!     ExternalEvent::Start("a".into()),
//!     ExternalEvent::Start("c".into()),
//!     ExternalEvent::Send { receiver: "a".into(), payload: Payload::user(b"go".as_slice()) },
//! ];
//! let mut explorer = Explorer::new(EngineConfig::default(), externals);
//! let outcome = explorer.explore(&mut runtime, None, |_rt| None)?;
//! assert_eq!(outcome, ExplorationOutcome::Exhausted);
//! ```
//!
//! # Scope
//!
//! The search is bounded and checks safety only: no liveness checking,
//! no completeness claims. Program code under test must be deterministic
//! given the delivery order.

#![warn(missing_docs)]

pub mod config;
pub mod dpor;
pub mod error;
pub mod event;
pub mod graph;
pub mod lab;
pub mod minimize;
pub mod oracle;
pub mod pending;
pub mod runtime;
pub mod stats;
pub mod trace;
pub mod types;
pub mod util;

pub use config::{DivergencePolicy, EngineConfig, LaneOrder, TimeBudget};
pub use dpor::{DporScheduler, QuiescenceOutcome};
pub use error::{EngineError, EngineInvariant};
pub use event::{Event, MsgEvent, Payload, Unique};
pub use oracle::{EngineOracle, ExplorationOutcome, Explorer, TestOracle};
pub use runtime::{ActorRuntime, CellRef, Envelope, ExternalEvent};
pub use trace::{read_trace, write_trace, Trace, TraceStep, WildCard, WildCardKind};
pub use types::{ActorName, EventId, Fingerprint, QuiescentEpoch};
