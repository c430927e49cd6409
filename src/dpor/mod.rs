//! Dynamic partial-order reduction: analyzer, trackers, and the driver.
//!
//! # Submodules
//!
//! - [`analyzer`]: co-enabledness, race detection, replay-prefix
//!   construction
//! - [`backtrack`]: the backtrack-point priority queue
//! - [`explored`]: memo of already-scheduled interleavings
//! - [`scheduler`]: the driver state machine

pub mod analyzer;
pub mod backtrack;
pub mod explored;
pub mod scheduler;

pub use analyzer::{analyze_dep, co_enabled, NextInterleaving};
pub use backtrack::{BacktrackPoint, BacktrackQueue};
pub use explored::ExploredTracker;
pub use scheduler::{Dispatch, DporScheduler, QuiescenceOutcome};
