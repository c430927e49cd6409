//! Memoization of already-scheduled interleavings.
//!
//! When a backtrack point is taken, its `(earlier, later)` pair is marked
//! under the branch index it was scheduled at. The analyzer consults the
//! tracker before enqueueing so an already-explored reversal never
//! re-enters the queue, and `trim` discards marks deeper than a freshly
//! taken branch — those states are no longer reachable once the search
//! commits to a shallower divergence.

use crate::event::Unique;
use std::collections::{BTreeMap, BTreeSet};

type PairKey = (u64, u64);

/// Keys are unordered: scheduling the reversal of `(earlier, later)`
/// executes the mirrored order, so both directions count as explored.
fn key(earlier: &Unique, later: &Unique) -> PairKey {
    let (a, b) = (earlier.id.raw(), later.id.raw());
    (a.min(b), a.max(b))
}

/// Per-depth memo of `(earlier, later)` pairs already scheduled.
#[derive(Debug, Default)]
pub struct ExploredTracker {
    by_depth: BTreeMap<usize, BTreeSet<PairKey>>,
}

impl ExploredTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the pair as scheduled at `depth`.
    pub fn mark(&mut self, depth: usize, earlier: &Unique, later: &Unique) {
        self.by_depth
            .entry(depth)
            .or_default()
            .insert(key(earlier, later));
    }

    /// True if the pair was already scheduled at `depth`.
    #[must_use]
    pub fn contains(&self, depth: usize, earlier: &Unique, later: &Unique) -> bool {
        self.by_depth
            .get(&depth)
            .is_some_and(|set| set.contains(&key(earlier, later)))
    }

    /// Discard entries at strictly greater depths; returns how many pairs
    /// were dropped.
    pub fn trim(&mut self, depth: usize) -> u64 {
        let discarded = self.by_depth.split_off(&(depth + 1));
        discarded.values().map(|set| set.len() as u64).sum()
    }

    /// Total marked pairs across all depths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_depth.values().map(BTreeSet::len).sum()
    }

    /// True if nothing has been marked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_depth.values().all(BTreeSet::is_empty)
    }
}
