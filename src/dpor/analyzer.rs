//! Race detection and replay-prefix construction.
//!
//! After every completed interleaving the analyzer scans the trace for
//! co-enabled pairs, and for each racing pair computes the divergence
//! point and the replay prefix that realizes the reversed order. The
//! resulting backtrack points drive the next interleavings.
//!
//! # References
//!
//! - Flanagan & Godefroid, "Dynamic partial-order reduction" (POPL 2005)

use crate::dpor::backtrack::{BacktrackPoint, BacktrackQueue};
use crate::dpor::explored::ExploredTracker;
use crate::event::{Event, Unique};
use crate::graph::DependencyGraph;
use crate::stats::ExplorationStats;
use tracing::{debug, trace as trace_log};

/// Co-enabledness: could both events be deliverable in the same state?
///
/// - Any pair involving a partition: yes (partitions commute with
///   everything at dispatch time).
/// - Any pair involving a quiescence barrier: no (the barrier orders the
///   run into disjoint windows).
/// - Two deliveries: same receiver, same quiescence epoch, and neither
///   causally precedes the other in the dependency graph.
#[must_use]
pub fn co_enabled(graph: &DependencyGraph, a: &Unique, b: &Unique) -> bool {
    match (&a.event, &b.event) {
        (Event::Quiescence, _) | (_, Event::Quiescence) => false,
        (Event::Partition(_), _) | (_, Event::Partition(_)) => true,
        (Event::Message(msg_a), Event::Message(msg_b)) => {
            msg_a.receiver == msg_b.receiver
                && graph.epoch(a.id).is_some()
                && graph.epoch(a.id) == graph.epoch(b.id)
                && !graph.is_ancestor_of(a.id, b.id)
                && !graph.is_ancestor_of(b.id, a.id)
        }
        _ => false,
    }
}

/// Compute the divergence point and replay prefix for a racing pair.
///
/// Returns `(branch index, replay prefix)`: execute the trace through the
/// branch index inclusive, then append the prefix, and the pair runs in
/// the reversed order. Indices are positions in `trace`, whose position 0
/// is the root sentinel.
#[must_use]
pub fn analyze_dep(
    graph: &DependencyGraph,
    trace: &[Unique],
    earlier_idx: usize,
    later_idx: usize,
) -> Option<(usize, Vec<Unique>)> {
    let earlier = &trace[earlier_idx];
    let later = &trace[later_idx];

    match (&earlier.event, &later.event) {
        // A delivery racing a later partition: rerun the prefix up to the
        // delivery, but fire the partition first.
        (Event::Message(_), Event::Partition(_)) => {
            Some((earlier_idx, vec![later.clone(), earlier.clone()]))
        }

        // A partition racing a later delivery: branch just before the
        // partition, run the in-between events and the delivery, then the
        // partition last.
        (Event::Partition(_), Event::Message(_)) => {
            let mut prefix: Vec<Unique> = trace[earlier_idx + 1..=later_idx].to_vec();
            prefix.push(earlier.clone());
            Some((earlier_idx.checked_sub(1)?, prefix))
        }

        // Two deliveries: branch at the deepest point where both causal
        // histories still agree, then deliver everything up through
        // `later` with `earlier` filtered out.
        (Event::Message(_), Event::Message(_)) => {
            let ancestor = graph.last_shared_ancestor(earlier.id, later.id)?;
            let branch = trace.iter().position(|u| u.id == ancestor)?;
            let prefix: Vec<Unique> = trace[branch + 1..=later_idx]
                .iter()
                .filter(|u| u.id != earlier.id)
                .cloned()
                .collect();
            Some((branch, prefix))
        }

        _ => None,
    }
}

/// Scan a completed trace for races and enqueue their backtrack points.
///
/// Pairs already scheduled (per the explored tracker) are skipped, as are
/// identical pending entries — two analyses arriving at the same
/// divergence grow the queue by exactly one.
pub fn detect_races(
    graph: &DependencyGraph,
    trace: &[Unique],
    explored: &ExploredTracker,
    backtrack: &mut BacktrackQueue,
    stats: &mut ExplorationStats,
) {
    for later_idx in 1..trace.len() {
        for earlier_idx in 1..later_idx {
            let earlier = &trace[earlier_idx];
            let later = &trace[later_idx];
            if earlier.id.is_noise() || later.id.is_noise() {
                continue;
            }
            if earlier.is_spawn() || later.is_spawn() {
                continue;
            }
            if !co_enabled(graph, earlier, later) {
                continue;
            }
            let Some((branch, prefix)) = analyze_dep(graph, trace, earlier_idx, later_idx) else {
                continue;
            };
            stats.races_detected += 1;
            if explored.contains(branch, earlier, later) {
                stats.backtracks_deduped += 1;
                continue;
            }
            trace_log!(
                branch,
                earlier = %earlier,
                later = %later,
                "race found, enqueueing backtrack point"
            );
            if backtrack.push(BacktrackPoint {
                depth: branch,
                earlier: earlier.clone(),
                later: later.clone(),
                prefix,
            }) {
                stats.backtracks_enqueued += 1;
            } else {
                stats.backtracks_deduped += 1;
            }
        }
    }
}

/// The next interleaving to execute, produced by popping the backtrack
/// queue.
#[derive(Debug)]
pub struct NextInterleaving {
    /// Full schedule for the next run: shared prefix plus replay events.
    pub trace: Vec<Unique>,
    /// The reversed pair the replay is expected to deliver, in order.
    pub expected: (Unique, Unique),
    /// Branch depth the divergence was scheduled at.
    pub depth: usize,
}

/// Pop the deepest unexplored backtrack point and build the next trace.
///
/// Entries whose pair was scheduled after they were enqueued are dropped
/// lazily here; taking a point marks it and trims deeper memo entries.
pub fn select_next(
    trace: &[Unique],
    backtrack: &mut BacktrackQueue,
    explored: &mut ExploredTracker,
    stats: &mut ExplorationStats,
) -> Option<NextInterleaving> {
    loop {
        let point = backtrack.pop()?;
        if explored.contains(point.depth, &point.earlier, &point.later) {
            stats.backtracks_deduped += 1;
            continue;
        }
        explored.mark(point.depth, &point.earlier, &point.later);
        stats.trimmed_entries += explored.trim(point.depth);
        stats.backtracks_scheduled += 1;

        // Entries can outlive the trace that created them if a replay
        // diverged; clamp so the shared prefix stays well-formed.
        let cut = point.depth.min(trace.len().saturating_sub(1));
        let mut next: Vec<Unique> = trace[..=cut].to_vec();
        next.extend(point.prefix.iter().cloned());
        debug!(
            depth = point.depth,
            len = next.len(),
            earlier = %point.earlier,
            later = %point.later,
            "scheduling reversed race"
        );
        return Some(NextInterleaving {
            trace: next,
            expected: (point.earlier, point.later),
            depth: point.depth,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MsgEvent, Payload, PartitionEvent};
    use crate::types::{EventId, QuiescentEpoch};

    fn msg(sender: &str, receiver: &str, bytes: &[u8]) -> Event {
        Event::Message(MsgEvent {
            sender: sender.into(),
            receiver: receiver.into(),
            payload: Payload::user(bytes),
        })
    }

    /// Two sibling deliveries to the same receiver under the root.
    fn sibling_race() -> (DependencyGraph, Vec<Unique>) {
        let mut graph = DependencyGraph::new();
        let epoch = QuiescentEpoch::INITIAL;
        let m1 = graph.add_child(EventId::ROOT, msg("a", "c", b"m1"), epoch);
        let m2 = graph.add_child(EventId::ROOT, msg("a", "c", b"m2"), epoch);
        let trace = vec![
            Unique::root(),
            graph.unique(m1).unwrap().clone(),
            graph.unique(m2).unwrap().clone(),
        ];
        (graph, trace)
    }

    #[test]
    fn siblings_to_same_receiver_are_co_enabled() {
        let (graph, trace) = sibling_race();
        assert!(co_enabled(&graph, &trace[1], &trace[2]));
    }

    #[test]
    fn causally_ordered_deliveries_are_not_co_enabled() {
        let mut graph = DependencyGraph::new();
        let epoch = QuiescentEpoch::INITIAL;
        let m1 = graph.add_child(EventId::ROOT, msg("a", "c", b"m1"), epoch);
        let m2 = graph.add_child(m1, msg("c", "c", b"m2"), epoch);
        let a = graph.unique(m1).unwrap().clone();
        let b = graph.unique(m2).unwrap().clone();
        assert!(!co_enabled(&graph, &a, &b));
    }

    #[test]
    fn epoch_mismatch_blocks_co_enabledness() {
        let mut graph = DependencyGraph::new();
        let m1 = graph.add_child(EventId::ROOT, msg("a", "c", b"m1"), QuiescentEpoch::INITIAL);
        let m2 = graph.add_child(
            EventId::ROOT,
            msg("a", "c", b"m2"),
            QuiescentEpoch::opened_by(EventId::new(9)),
        );
        let a = graph.unique(m1).unwrap().clone();
        let b = graph.unique(m2).unwrap().clone();
        assert!(!co_enabled(&graph, &a, &b));
    }

    #[test]
    fn quiescence_is_never_co_enabled() {
        let (mut graph, trace) = sibling_race();
        let q = graph.add_detached(Event::Quiescence, QuiescentEpoch::INITIAL);
        let marker = graph.unique(q).unwrap().clone();
        assert!(!co_enabled(&graph, &trace[1], &marker));
        assert!(!co_enabled(&graph, &marker, &trace[2]));
    }

    #[test]
    fn message_race_branches_at_shared_ancestor() {
        let (graph, trace) = sibling_race();
        let (branch, prefix) = analyze_dep(&graph, &trace, 1, 2).expect("racing pair");
        // Shared ancestor is the root at position 0.
        assert_eq!(branch, 0);
        // Prefix delivers m2 with m1 filtered out.
        assert_eq!(prefix.len(), 1);
        assert_eq!(prefix[0].id, trace[2].id);
    }

    #[test]
    fn partition_later_prefix_swaps_pair() {
        let mut graph = DependencyGraph::new();
        let epoch = QuiescentEpoch::INITIAL;
        let m1 = graph.add_child(EventId::ROOT, msg("a", "b", b"m1"), epoch);
        let p = graph.add_detached(
            Event::Partition(PartitionEvent::new(vec!["a".into()], vec!["b".into()])),
            epoch,
        );
        let trace = vec![
            Unique::root(),
            graph.unique(m1).unwrap().clone(),
            graph.unique(p).unwrap().clone(),
        ];
        let (branch, prefix) = analyze_dep(&graph, &trace, 1, 2).expect("racing pair");
        assert_eq!(branch, 1);
        assert_eq!(prefix[0].id, trace[2].id);
        assert_eq!(prefix[1].id, trace[1].id);
    }

    #[test]
    fn partition_earlier_branches_before_it() {
        let mut graph = DependencyGraph::new();
        let epoch = QuiescentEpoch::INITIAL;
        let p = graph.add_detached(
            Event::Partition(PartitionEvent::new(vec!["a".into()], vec!["b".into()])),
            epoch,
        );
        let m1 = graph.add_child(EventId::ROOT, msg("a", "b", b"m1"), epoch);
        let trace = vec![
            Unique::root(),
            graph.unique(p).unwrap().clone(),
            graph.unique(m1).unwrap().clone(),
        ];
        let (branch, prefix) = analyze_dep(&graph, &trace, 1, 2).expect("racing pair");
        assert_eq!(branch, 0);
        // Everything after the partition through the delivery, then the
        // partition last.
        assert_eq!(prefix.len(), 2);
        assert_eq!(prefix[0].id, trace[2].id);
        assert_eq!(prefix[1].id, trace[1].id);
    }

    #[test]
    fn detect_races_dedups_repeat_analysis() {
        let (graph, trace) = sibling_race();
        let mut backtrack = BacktrackQueue::new();
        let mut explored = ExploredTracker::new();
        let mut stats = ExplorationStats::default();
        detect_races(&graph, &trace, &explored, &mut backtrack, &mut stats);
        let after_first = backtrack.len();
        detect_races(&graph, &trace, &explored, &mut backtrack, &mut stats);
        assert_eq!(backtrack.len(), after_first);
        assert!(stats.backtracks_deduped > 0);

        let next = select_next(&trace, &mut backtrack, &mut explored, &mut stats)
            .expect("one reversal to run");
        assert_eq!(next.depth, 0);
        // Replaying the selected trace must not re-enqueue the pair.
        detect_races(&graph, &trace, &explored, &mut backtrack, &mut stats);
        assert!(select_next(&trace, &mut backtrack, &mut explored, &mut stats).is_none());
    }
}
