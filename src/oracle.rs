//! The exploration loop and the test-oracle façade.
//!
//! An [`Explorer`] owns one engine and drives a runtime through every
//! interleaving the analyzer schedules, injecting external events with
//! barrier-aware pacing and checking the user invariant after each
//! completed run. Restart-and-replay between interleavings is one trip
//! around the outer loop — no suspended threads.
//!
//! [`EngineOracle`] wraps the explorer as the capability the minimizer
//! consumes: replay a candidate schedule, report whether the violation
//! fingerprint reproduced.

use crate::config::{EngineConfig, TimeBudget};
use crate::dpor::{DporScheduler, QuiescenceOutcome};
use crate::error::EngineError;
use crate::event::{Event, Unique};
use crate::minimize::wildcard::AmbiguityResolver;
use crate::runtime::{ActorRuntime, ExternalEvent};
use crate::stats::MinimizationStats;
use crate::trace::Trace;
use crate::types::Fingerprint;
use std::collections::BTreeMap;
use tracing::debug;

/// Why an exploration stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExplorationOutcome {
    /// The invariant produced a (matching) violation fingerprint.
    Violation {
        /// The executed trace that reached the violation.
        trace: Trace,
        /// The fingerprint the invariant produced.
        fingerprint: Fingerprint,
    },
    /// Every backtrack point was explored without a violation.
    Exhausted,
    /// The time budget ran out; the search halted cleanly.
    BudgetExhausted,
    /// The interleaving cap was reached.
    InterleavingCapReached,
}

/// Drives a runtime through all interleavings of one external-event
/// sequence.
#[derive(Debug)]
pub struct Explorer {
    scheduler: DporScheduler,
    externals: Vec<ExternalEvent>,
    /// Stable identities for partition/quiescence externals, keyed by
    /// their position in the sequence.
    markers: BTreeMap<usize, Unique>,
    /// Schedule to impose on the first interleaving (minimizer replay).
    initial_schedule: Option<Trace>,
}

impl Explorer {
    /// Explorer for the given external-event sequence.
    #[must_use]
    pub fn new(config: EngineConfig, externals: Vec<ExternalEvent>) -> Self {
        Self {
            scheduler: DporScheduler::new(config),
            externals,
            markers: BTreeMap::new(),
            initial_schedule: None,
        }
    }

    /// Explorer whose first interleaving replays `schedule`.
    #[must_use]
    pub fn with_schedule(
        config: EngineConfig,
        externals: Vec<ExternalEvent>,
        schedule: Trace,
    ) -> Self {
        let mut explorer = Self::new(config, externals);
        explorer.initial_schedule = Some(schedule);
        explorer
    }

    /// The engine.
    #[must_use]
    pub fn scheduler(&self) -> &DporScheduler {
        &self.scheduler
    }

    /// The engine, mutably (resolver installation, statistics drains).
    pub fn scheduler_mut(&mut self) -> &mut DporScheduler {
        &mut self.scheduler
    }

    /// Run interleavings until a violation, exhaustion, or a budget stop.
    ///
    /// `check` is the user invariant, evaluated at the end of each
    /// interleaving; `target` restricts which violation fingerprints
    /// count (any, when `None`).
    pub fn explore<R: ActorRuntime>(
        &mut self,
        runtime: &mut R,
        target: Option<Fingerprint>,
        check: impl Fn(&R) -> Option<Fingerprint>,
    ) -> Result<ExplorationOutcome, EngineError> {
        loop {
            self.scheduler.begin_interleaving();
            if let Some(schedule) = self.initial_schedule.take() {
                self.scheduler.set_schedule(&schedule);
            }
            runtime.restart_system();

            let mut cursor = 0;
            self.inject_until_barrier(runtime, &mut cursor)?;
            loop {
                while let Some(dispatch) = self.scheduler.schedule_new_message()? {
                    runtime.deliver(&mut self.scheduler, &dispatch.cell, &dispatch.envelope)?;
                }
                match self.scheduler.notify_quiescence() {
                    QuiescenceOutcome::BarrierCommitted => {
                        self.inject_until_barrier(runtime, &mut cursor)?;
                    }
                    QuiescenceOutcome::InterleavingComplete => break,
                }
            }

            if let Some(fingerprint) = check(runtime) {
                if target.map_or(true, |t| t == fingerprint) {
                    debug!(%fingerprint, "violation reproduced");
                    return Ok(ExplorationOutcome::Violation {
                        trace: Trace::from_events(self.scheduler.current_trace().to_vec()),
                        fingerprint,
                    });
                }
                debug!(%fingerprint, "off-target violation ignored");
            }

            if self.scheduler.config().budget.expired() {
                return Ok(ExplorationOutcome::BudgetExhausted);
            }
            if let Some(cap) = self.scheduler.config().max_interleavings {
                if self.scheduler.stats().interleavings >= cap {
                    return Ok(ExplorationOutcome::InterleavingCapReached);
                }
            }
            if !self.scheduler.prepare_next_interleaving() {
                return Ok(ExplorationOutcome::Exhausted);
            }
        }
    }

    /// Inject external events in order, pausing at an uncommitted
    /// quiescence barrier; committing it resumes from `cursor`.
    fn inject_until_barrier<R: ActorRuntime>(
        &mut self,
        runtime: &mut R,
        cursor: &mut usize,
    ) -> Result<(), EngineError> {
        self.scheduler.begin_external_injection();
        while *cursor < self.externals.len() {
            let index = *cursor;
            *cursor += 1;
            match self.externals[index].clone() {
                ExternalEvent::Start(name) => runtime.start_actor(&name)?,
                ExternalEvent::Send { receiver, payload } => {
                    runtime.inject(&mut self.scheduler, &receiver, payload)?;
                }
                ExternalEvent::Partition(partition) => {
                    let marker = self.marker_for(index, Event::Partition(partition));
                    self.scheduler.enqueue_marker(marker);
                }
                ExternalEvent::WaitQuiescence => {
                    let marker = self.marker_for(index, Event::Quiescence);
                    self.scheduler.enqueue_marker(marker);
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Stable identity for the marker external at `index`, allocated on
    /// first use and reused in every later run.
    fn marker_for(&mut self, index: usize, event: Event) -> Unique {
        if let Some(existing) = self.markers.get(&index) {
            return existing.clone();
        }
        let marker = self.scheduler.external_marker(event);
        self.markers.insert(index, marker.clone());
        marker
    }
}

// ---------------------------------------------------------------------------
// Oracle façade
// ---------------------------------------------------------------------------

/// The capability the minimizer consumes: replay a candidate and report
/// whether the expected violation reproduced.
pub trait TestOracle {
    /// Run the externals under `schedule`; return the executed trace if
    /// the violation fingerprint `expected` reproduced within `budget`.
    fn test(
        &mut self,
        externals: &[ExternalEvent],
        schedule: &Trace,
        expected: Fingerprint,
        budget: TimeBudget,
        stats: &mut MinimizationStats,
    ) -> Option<Trace>;
}

/// [`TestOracle`] backed by a fresh DPOR engine per candidate.
pub struct EngineOracle<R, F> {
    runtime: R,
    check: F,
    config: EngineConfig,
    make_resolver: Box<dyn Fn() -> Box<dyn AmbiguityResolver>>,
}

impl<R, F> EngineOracle<R, F>
where
    R: ActorRuntime,
    F: Fn(&R) -> Option<Fingerprint>,
{
    /// Oracle over the given runtime and invariant, replaying candidates
    /// with the ambiguity-resolution strategy `make_resolver` builds.
    pub fn new(
        runtime: R,
        check: F,
        config: EngineConfig,
        make_resolver: impl Fn() -> Box<dyn AmbiguityResolver> + 'static,
    ) -> Self {
        Self {
            runtime,
            check,
            config,
            make_resolver: Box::new(make_resolver),
        }
    }

    /// The wrapped runtime.
    pub fn runtime(&self) -> &R {
        &self.runtime
    }
}

impl<R, F> TestOracle for EngineOracle<R, F>
where
    R: ActorRuntime,
    F: Fn(&R) -> Option<Fingerprint>,
{
    fn test(
        &mut self,
        externals: &[ExternalEvent],
        schedule: &Trace,
        expected: Fingerprint,
        budget: TimeBudget,
        stats: &mut MinimizationStats,
    ) -> Option<Trace> {
        let mut config = self.config.clone();
        config.budget = budget;
        let mut explorer =
            Explorer::with_schedule(config, externals.to_vec(), schedule.clone());
        explorer
            .scheduler_mut()
            .set_resolver((self.make_resolver)());
        explorer.scheduler_mut().set_strict_replay(true);

        stats.oracle_runs += 1;
        let outcome = explorer.explore(&mut self.runtime, Some(expected), &self.check);
        // Only wildcard origins translate across engines; engine-local
        // ids from staged replays are meaningless to the clusterizer.
        stats.record_absent(explorer.scheduler_mut().take_absent_origins());

        match outcome {
            Ok(ExplorationOutcome::Violation { trace, .. }) => {
                stats.reproductions += 1;
                Some(trace)
            }
            Ok(_) => None,
            Err(err) => {
                // A driver bug during a candidate replay is surfaced by
                // the exploration API; from the minimizer's point of view
                // the candidate simply failed to reproduce.
                debug!(error = %err, "candidate replay aborted");
                None
            }
        }
    }
}
