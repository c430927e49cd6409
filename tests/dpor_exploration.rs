//! DPOR exploration integration tests.
//!
//! Drives the full engine (explorer + scheduler + analyzer) against the
//! lab runtime. Pass criteria:
//!
//! 1. **Race reversal**: two same-receiver deliveries produce exactly two
//!    interleavings, one per order, and the backtrack queue drains.
//! 2. **Identity stability**: replays observe the same unique ids at the
//!    same logical positions.
//! 3. **Explored dedup**: re-analyzing a trace never grows the backtrack
//!    queue.
//! 4. **Analysis idempotence**: the same trace yields the same candidate
//!    set into fresh queues.
//! 5. **Termination**: a finite-state program with several races drains
//!    the queue in finitely many interleavings.

use actorlab::config::EngineConfig;
use actorlab::dpor::analyzer::detect_races;
use actorlab::dpor::{BacktrackQueue, ExploredTracker};
use actorlab::event::{Event, MsgEvent, Payload, Unique};
use actorlab::graph::DependencyGraph;
use actorlab::lab::SimRuntime;
use actorlab::oracle::{ExplorationOutcome, Explorer};
use actorlab::runtime::ExternalEvent;
use actorlab::stats::ExplorationStats;
use actorlab::types::{EventId, QuiescentEpoch};
use std::cell::RefCell;

fn fanout_runtime(count: usize) -> SimRuntime {
    let mut runtime = SimRuntime::new();
    runtime.register("a", move || {
        Box::new(move |ctx, _env| {
            for i in 1..=count {
                ctx.send("c", Payload::user(format!("m{i}").into_bytes()));
            }
        })
    });
    runtime.register("c", || {
        Box::new(|ctx, env| {
            if let Payload::User(user) = &env.payload {
                ctx.log(String::from_utf8_lossy(&user.bytes).into_owned());
            }
        })
    });
    runtime
}

fn fanout_externals() -> Vec<ExternalEvent> {
    vec![
        ExternalEvent::Start("a".into()),
        ExternalEvent::Start("c".into()),
        ExternalEvent::Send {
            receiver: "a".into(),
            payload: Payload::user(b"go".as_slice()),
        },
    ]
}

// ---------------------------------------------------------------------------
// Criterion 1 + 2: race reversal with stable identities
// ---------------------------------------------------------------------------

#[test]
fn two_sibling_deliveries_explore_both_orders() {
    let mut runtime = fanout_runtime(2);
    let mut explorer = Explorer::new(EngineConfig::default(), fanout_externals());

    let orders: RefCell<Vec<Vec<String>>> = RefCell::new(Vec::new());
    let outcome = explorer
        .explore(&mut runtime, None, |rt: &SimRuntime| {
            orders.borrow_mut().push(rt.log());
            None
        })
        .expect("exploration");

    assert_eq!(outcome, ExplorationOutcome::Exhausted);
    let orders = orders.into_inner();
    assert_eq!(orders.len(), 2, "exactly two distinct interleavings");
    assert_eq!(orders[0], vec!["m1".to_string(), "m2".to_string()]);
    assert_eq!(orders[1], vec!["m2".to_string(), "m1".to_string()]);
    assert!(explorer.scheduler().backtrack_exhausted());
}

#[test]
fn replays_preserve_unique_ids() {
    let mut runtime = fanout_runtime(2);
    let mut explorer = Explorer::new(EngineConfig::default(), fanout_externals());

    explorer
        .explore(&mut runtime, None, |_rt| None)
        .expect("exploration");
    // The final trace still addresses the ids allocated in run one.
    let ids: Vec<u64> = explorer
        .scheduler()
        .current_trace()
        .iter()
        .map(|u| u.id.raw())
        .collect();
    assert_eq!(ids[0], 0, "trace starts at the root sentinel");
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), ids.len(), "no id is reused within a run");
}

// ---------------------------------------------------------------------------
// Criterion 3 + 4: dedup and idempotence of the analysis
// ---------------------------------------------------------------------------

fn sibling_graph() -> (DependencyGraph, Vec<Unique>) {
    let mut graph = DependencyGraph::new();
    let epoch = QuiescentEpoch::INITIAL;
    let mk = |sender: &str, receiver: &str, bytes: &[u8]| {
        Event::Message(MsgEvent {
            sender: sender.into(),
            receiver: receiver.into(),
            payload: Payload::user(bytes),
        })
    };
    let parent = graph.add_child(EventId::ROOT, mk("x", "a", b"go"), epoch);
    let m1 = graph.add_child(parent, mk("a", "c", b"m1"), epoch);
    let m2 = graph.add_child(parent, mk("a", "c", b"m2"), epoch);
    let trace = vec![
        Unique::root(),
        graph.unique(parent).unwrap().clone(),
        graph.unique(m1).unwrap().clone(),
        graph.unique(m2).unwrap().clone(),
    ];
    (graph, trace)
}

#[test]
fn repeated_analysis_grows_queue_by_zero() {
    let (graph, trace) = sibling_graph();
    let mut queue = BacktrackQueue::new();
    let explored = ExploredTracker::new();
    let mut stats = ExplorationStats::default();

    detect_races(&graph, &trace, &explored, &mut queue, &mut stats);
    let size = queue.len();
    assert_eq!(size, 1);
    detect_races(&graph, &trace, &explored, &mut queue, &mut stats);
    assert_eq!(queue.len(), size, "identical analysis deduplicates");
    assert!(stats.backtracks_deduped > 0);
}

#[test]
fn analysis_is_idempotent_into_fresh_queues() {
    let (graph, trace) = sibling_graph();
    let mut first = Vec::new();
    let mut second = Vec::new();

    for out in [&mut first, &mut second] {
        let mut queue = BacktrackQueue::new();
        let explored = ExploredTracker::new();
        let mut stats = ExplorationStats::default();
        detect_races(&graph, &trace, &explored, &mut queue, &mut stats);
        while let Some(point) = queue.pop() {
            out.push((point.depth, point.earlier.id, point.later.id));
        }
    }
    assert_eq!(first, second);
}

// ---------------------------------------------------------------------------
// Criterion 5: termination on a finite-state program
// ---------------------------------------------------------------------------

#[test]
fn three_way_race_terminates() {
    let mut runtime = fanout_runtime(3);
    let mut explorer = Explorer::new(EngineConfig::default(), fanout_externals());

    let orders: RefCell<Vec<Vec<String>>> = RefCell::new(Vec::new());
    let outcome = explorer
        .explore(&mut runtime, None, |rt: &SimRuntime| {
            orders.borrow_mut().push(rt.log());
            None
        })
        .expect("exploration");

    assert_eq!(outcome, ExplorationOutcome::Exhausted);
    let orders = orders.into_inner();
    assert!(
        orders.len() >= 3,
        "several distinct interleavings, got {}",
        orders.len()
    );
    // Every explored order is distinct.
    let mut dedup = orders.clone();
    dedup.sort();
    dedup.dedup();
    assert_eq!(dedup.len(), orders.len());
    assert!(explorer.scheduler().backtrack_exhausted());
}

// ---------------------------------------------------------------------------
// Depth bound keeps infinite programs finite
// ---------------------------------------------------------------------------

#[test]
fn depth_bound_cuts_unbounded_echo() {
    let mut runtime = SimRuntime::new();
    // Two actors echo forever.
    runtime.register("ping", || {
        Box::new(|ctx, _env| ctx.send("pong", Payload::user(b"ball".as_slice())))
    });
    runtime.register("pong", || {
        Box::new(|ctx, _env| ctx.send("ping", Payload::user(b"ball".as_slice())))
    });

    let config = EngineConfig {
        max_depth: Some(8),
        ..EngineConfig::default()
    };
    let externals = vec![
        ExternalEvent::Start("ping".into()),
        ExternalEvent::Start("pong".into()),
        ExternalEvent::Send {
            receiver: "ping".into(),
            payload: Payload::user(b"serve".as_slice()),
        },
    ];
    let mut explorer = Explorer::new(config, externals);
    let outcome = explorer
        .explore(&mut runtime, None, |_rt| None)
        .expect("exploration");
    assert_eq!(outcome, ExplorationOutcome::Exhausted);
    assert!(explorer.scheduler().stats().depth_bound_drops > 0);
}
