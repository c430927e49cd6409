//! Clock-cluster trace minimization.
//!
//! Given a violating trace, the clusterizer shrinks it while an oracle
//! still reproduces the violation fingerprint. Deliveries are grouped by
//! the application protocol's logical clock: a cluster is removed or kept
//! atomically, timers (clock-incrementing messages) are swept one at a
//! time by their own iterator, and unclocked deliveries are always kept.
//! Removing a cluster permanently blacklists its ids.
//!
//! Kept deliveries are rewritten as [`WildCard`] predicates so candidates
//! keep matching after surrounding removals shift message identities; see
//! [`wildcard`] for the ambiguity-resolution strategies applied when a
//! predicate matches several pending messages.
//!
//! # Submodules
//!
//! - [`wildcard`]: wildcard ambiguity-resolution strategies

pub mod wildcard;

use crate::config::TimeBudget;
use crate::event::{Event, Unique};
use crate::oracle::TestOracle;
use crate::runtime::ExternalEvent;
use crate::stats::MinimizationStats;
use crate::trace::{Trace, TraceStep, WildCard};
use crate::types::{EventId, Fingerprint};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::debug;

/// How eagerly the timer sweep gives up within each cluster iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggressiveness {
    /// Exhaustive timer sweep on every cluster iteration.
    #[default]
    None,
    /// Exhaustive sweep only on iteration 0; later iterations stop at
    /// the first reproducing candidate.
    AllTimersFirstItr,
    /// Stop at the first reproducing candidate, always.
    StopImmediately,
}

/// Result of a minimization run.
#[derive(Debug)]
pub struct MinimizationResult {
    /// The minimized schedule (a wildcard rewrite of a subset of the
    /// original trace); verified to reproduce the fingerprint.
    pub schedule: Trace,
    /// The executed trace of the schedule's last successful replay.
    pub witness: Trace,
    /// Counters for the whole run.
    pub stats: MinimizationStats,
}

/// Clock-grouped minimizer with a pluggable oracle.
#[derive(Debug)]
pub struct ClockClusterizer {
    aggressiveness: Aggressiveness,
    budget: TimeBudget,
}

impl ClockClusterizer {
    /// Minimizer with an unlimited time budget.
    #[must_use]
    pub fn new(aggressiveness: Aggressiveness) -> Self {
        Self {
            aggressiveness,
            budget: TimeBudget::unlimited(),
        }
    }

    /// Cap the whole minimization; the budget is divided evenly across
    /// cluster iterations.
    #[must_use]
    pub fn with_budget(mut self, budget: TimeBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Shrink `original` while `oracle` still reproduces `fingerprint`.
    pub fn minimize<O: TestOracle>(
        &self,
        oracle: &mut O,
        externals: &[ExternalEvent],
        original: &Trace,
        fingerprint: Fingerprint,
    ) -> MinimizationResult {
        let start = Instant::now();
        let mut stats = MinimizationStats::default();
        stats.deliveries_original = original.delivery_count() as u64;

        let groups = Groups::classify(original);
        stats.clusters_total = groups.clusters.len() as u64;

        let mut kept_clusters: BTreeSet<u64> = groups.clusters.keys().copied().collect();
        let mut kept_timers: BTreeSet<EventId> = groups.timers.iter().copied().collect();

        let iterations = groups.clusters.len() + 1;

        // Iteration 0: all clusters in, sweep the timers.
        let exhaustive0 = matches!(
            self.aggressiveness,
            Aggressiveness::None | Aggressiveness::AllTimersFirstItr
        );
        let iter_budget = self.budget.split(iterations);
        let Some((timers, witness)) = self.sweep_timers(
            oracle,
            externals,
            original,
            fingerprint,
            &kept_clusters,
            &kept_timers,
            exhaustive0,
            iter_budget,
            &mut stats,
        ) else {
            // The full trace no longer reproduces: nothing to minimize,
            // fall back to the original.
            debug!("original trace did not reproduce; returning it unchanged");
            stats.deliveries_final = stats.deliveries_original;
            stats.wall_time_ms = start.elapsed().as_millis() as u64;
            return MinimizationResult {
                schedule: original.clone(),
                witness: original.clone(),
                stats,
            };
        };
        kept_timers = timers;
        let mut best_schedule =
            build_candidate(original, &kept_clusters, &kept_timers, &stats.absent_ignored);
        let mut best_witness = witness;

        // One iteration per clock, ascending: drop the cluster, re-sweep
        // the timers over the residual trace.
        let clocks: Vec<u64> = groups.clusters.keys().copied().collect();
        let mut remaining = iterations - 1;
        for clock in clocks {
            if self.budget.expired() {
                debug!("minimization budget exhausted; keeping best so far");
                break;
            }
            let iter_budget = self.budget.split(remaining);
            remaining = remaining.saturating_sub(1).max(1);

            let mut trial_clusters = kept_clusters.clone();
            trial_clusters.remove(&clock);
            let exhaustive = matches!(self.aggressiveness, Aggressiveness::None);

            if let Some((timers, witness)) = self.sweep_timers(
                oracle,
                externals,
                original,
                fingerprint,
                &trial_clusters,
                &kept_timers,
                exhaustive,
                iter_budget,
                &mut stats,
            ) {
                debug!(clock, "cluster removed");
                kept_clusters = trial_clusters;
                kept_timers = timers;
                stats.clusters_removed += 1;
                best_schedule = build_candidate(
                    original,
                    &kept_clusters,
                    &kept_timers,
                    &stats.absent_ignored,
                );
                best_witness = witness;
            }
        }

        // Verify the minimized schedule; on failure, recover by falling
        // back to the last known-good candidate.
        let final_schedule =
            build_candidate(original, &kept_clusters, &kept_timers, &stats.absent_ignored);
        if final_schedule != best_schedule {
            match oracle.test(
                externals,
                &final_schedule,
                fingerprint,
                self.budget.split(1),
                &mut stats,
            ) {
                Some(witness) => {
                    best_schedule = final_schedule;
                    best_witness = witness;
                }
                None => {
                    debug!("verification failed; falling back to known-good schedule");
                }
            }
        }

        stats.deliveries_final = best_schedule.delivery_count() as u64;
        stats.wall_time_ms = start.elapsed().as_millis() as u64;
        MinimizationResult {
            schedule: best_schedule,
            witness: best_witness,
            stats,
        }
    }

    /// Timer minimization over the residual trace: keep the given
    /// clusters, try dropping timers one at a time. Returns the kept
    /// timer set and the witness trace, or `None` if not even the full
    /// timer set reproduces.
    #[allow(clippy::too_many_arguments)]
    fn sweep_timers<O: TestOracle>(
        &self,
        oracle: &mut O,
        externals: &[ExternalEvent],
        original: &Trace,
        fingerprint: Fingerprint,
        clusters: &BTreeSet<u64>,
        timers_in: &BTreeSet<EventId>,
        exhaustive: bool,
        budget: TimeBudget,
        stats: &mut MinimizationStats,
    ) -> Option<(BTreeSet<EventId>, Trace)> {
        let mut timers = timers_in.clone();
        let base = build_candidate(original, clusters, &timers, &stats.absent_ignored);
        let mut witness = oracle.test(externals, &base, fingerprint, budget, stats)?;
        if !exhaustive {
            return Some((timers, witness));
        }

        for timer in timers_in {
            if budget.expired() {
                break;
            }
            let mut trial = timers.clone();
            if !trial.remove(timer) {
                continue;
            }
            let candidate = build_candidate(original, clusters, &trial, &stats.absent_ignored);
            if let Some(next_witness) =
                oracle.test(externals, &candidate, fingerprint, budget, stats)
            {
                timers = trial;
                witness = next_witness;
                stats.timers_removed += 1;
            }
        }
        Some((timers, witness))
    }
}

/// The original trace split into minimization groups.
struct Groups {
    /// Clock value → member ids, in trace order.
    clusters: BTreeMap<u64, Vec<EventId>>,
    /// Clock-incrementing deliveries, in trace order.
    timers: Vec<EventId>,
}

impl Groups {
    fn classify(original: &Trace) -> Self {
        let mut clusters: BTreeMap<u64, Vec<EventId>> = BTreeMap::new();
        let mut timers = Vec::new();
        for unique in original.deliveries() {
            let Some(msg) = unique.message() else {
                continue;
            };
            if msg.payload.causes_clock_increment() {
                timers.push(unique.id);
            } else if let Some(clock) = msg.payload.clock() {
                clusters.entry(clock).or_default().push(unique.id);
            }
        }
        Self { clusters, timers }
    }
}

/// Rewrite the kept subset of the original trace as a replay schedule.
///
/// Kept deliveries become wildcards; partition and quiescence markers are
/// kept as value-matching (noise-id) events; ids reported absent by
/// earlier replays are dropped.
fn build_candidate(
    original: &Trace,
    kept_clusters: &BTreeSet<u64>,
    kept_timers: &BTreeSet<EventId>,
    absent: &[EventId],
) -> Trace {
    let mut schedule = Trace::new();
    for step in original.steps() {
        let TraceStep::Event(unique) = step else {
            schedule.push(step.clone());
            continue;
        };
        match &unique.event {
            Event::Root | Event::Spawn(_) => {}
            Event::Partition(_) | Event::Quiescence => {
                schedule.push(TraceStep::Event(Unique::new(
                    unique.event.clone(),
                    EventId::ROOT,
                )));
            }
            Event::Message(msg) => {
                if absent.contains(&unique.id) {
                    continue;
                }
                let delivery = WildCard::message(
                    msg.receiver.clone(),
                    Some(msg.payload.fingerprint()),
                )
                .with_origin(unique.id);
                if msg.payload.causes_clock_increment() {
                    if kept_timers.contains(&unique.id) {
                        schedule
                            .push(TraceStep::WildCard(WildCard::timer().with_origin(unique.id)));
                    }
                } else if let Some(clock) = msg.payload.clock() {
                    if kept_clusters.contains(&clock) {
                        schedule.push(TraceStep::WildCard(delivery));
                    }
                } else {
                    schedule.push(TraceStep::WildCard(delivery));
                }
            }
        }
    }
    schedule
}
