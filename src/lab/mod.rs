//! Deterministic in-memory actor runtime for harness use.
//!
//! The lab runtime implements the [`crate::runtime::ActorRuntime`]
//! contract without threads or real I/O: actor behaviors are closures,
//! deliveries run synchronously, and every send performed by a handler is
//! routed back to the driver before the delivery call returns.

pub mod runtime;

pub use runtime::{ActorContext, Behavior, Blackboard, SimRuntime};
