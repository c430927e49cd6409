//! Search and minimization statistics.
//!
//! Recoverable conditions (replay divergence, absent expected ids, budget
//! exhaustion) are not errors; they surface here. Both report types offer
//! `Display` for logs and JSON export for artifact storage.

use crate::types::EventId;
use serde_json::json;
use std::fmt;

/// Counters for one exploration (all interleavings of one search).
#[derive(Debug, Clone, Default)]
pub struct ExplorationStats {
    /// Interleavings executed.
    pub interleavings: u64,
    /// Message deliveries dispatched across all interleavings.
    pub deliveries: u64,
    /// Deliveries that matched the replay prefix.
    pub convergent_steps: u64,
    /// Deliveries chosen while off the replay prefix.
    pub divergent_steps: u64,
    /// Racing pairs found by the analyzer.
    pub races_detected: u64,
    /// Backtrack points enqueued.
    pub backtracks_enqueued: u64,
    /// Enqueue attempts skipped because the pair was already explored or
    /// already queued.
    pub backtracks_deduped: u64,
    /// Backtrack points popped and scheduled as next traces.
    pub backtracks_scheduled: u64,
    /// Explored-tracker entries discarded by trims.
    pub trimmed_entries: u64,
    /// Replays where the expected race pair was not fully consumed.
    pub replay_divergences: u64,
    /// Expected ids that never fired during replay.
    pub absent_expected: u64,
    /// Messages silently dropped at a partition boundary.
    pub partition_drops: u64,
    /// Sends not enqueued because the depth bound was reached.
    pub depth_bound_drops: u64,
    /// Wildcard trace steps abandoned without a match.
    pub wildcard_giveups: u64,
}

impl ExplorationStats {
    /// JSON representation for artifact storage.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "interleavings": self.interleavings,
            "deliveries": self.deliveries,
            "steps": {
                "convergent": self.convergent_steps,
                "divergent": self.divergent_steps,
            },
            "races_detected": self.races_detected,
            "backtracks": {
                "enqueued": self.backtracks_enqueued,
                "deduped": self.backtracks_deduped,
                "scheduled": self.backtracks_scheduled,
                "trimmed": self.trimmed_entries,
            },
            "replay": {
                "divergences": self.replay_divergences,
                "absent_expected": self.absent_expected,
            },
            "drops": {
                "partition": self.partition_drops,
                "depth_bound": self.depth_bound_drops,
                "wildcard_giveup": self.wildcard_giveups,
            },
        })
    }
}

impl fmt::Display for ExplorationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interleavings: {}, deliveries: {}, races: {}, backtracks: {} enqueued / {} scheduled, divergences: {}",
            self.interleavings,
            self.deliveries,
            self.races_detected,
            self.backtracks_enqueued,
            self.backtracks_scheduled,
            self.replay_divergences,
        )
    }
}

/// Counters for one minimization run.
#[derive(Debug, Clone, Default)]
pub struct MinimizationStats {
    /// Oracle invocations.
    pub oracle_runs: u64,
    /// Oracle runs that reproduced the violation fingerprint.
    pub reproductions: u64,
    /// Clock clusters in the original trace.
    pub clusters_total: u64,
    /// Clusters removed (blacklisted).
    pub clusters_removed: u64,
    /// Timer deliveries removed.
    pub timers_removed: u64,
    /// Deliveries in the original trace.
    pub deliveries_original: u64,
    /// Deliveries in the minimized trace.
    pub deliveries_final: u64,
    /// Expected ids that never fired during candidate replays; the
    /// clusterizer drops these from future candidates.
    pub absent_ignored: Vec<EventId>,
    /// Wall time of the whole minimization (ms).
    pub wall_time_ms: u64,
}

impl MinimizationStats {
    /// Record ids reported absent by a replay.
    pub fn record_absent(&mut self, ids: impl IntoIterator<Item = EventId>) {
        for id in ids {
            if !self.absent_ignored.contains(&id) {
                self.absent_ignored.push(id);
            }
        }
    }

    /// Fraction of deliveries removed, in `0.0..=1.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn reduction_ratio(&self) -> f64 {
        if self.deliveries_original == 0 {
            return 0.0;
        }
        1.0 - (self.deliveries_final as f64 / self.deliveries_original as f64)
    }

    /// JSON representation for artifact storage.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "oracle_runs": self.oracle_runs,
            "reproductions": self.reproductions,
            "clusters": {
                "total": self.clusters_total,
                "removed": self.clusters_removed,
            },
            "timers_removed": self.timers_removed,
            "deliveries": {
                "original": self.deliveries_original,
                "final": self.deliveries_final,
                "reduction_ratio": self.reduction_ratio(),
            },
            "absent_ignored": self.absent_ignored.iter().map(|id| id.raw()).collect::<Vec<_>>(),
            "wall_time_ms": self.wall_time_ms,
        })
    }
}

impl fmt::Display for MinimizationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "oracle runs: {} ({} reproduced), clusters removed: {}/{}, deliveries: {} → {}",
            self.oracle_runs,
            self.reproductions,
            self.clusters_removed,
            self.clusters_total,
            self.deliveries_original,
            self.deliveries_final,
        )
    }
}
