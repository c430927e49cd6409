//! Dependency graph of unique events.
//!
//! The graph records, for every delivery observed during the search, which
//! delivery's processing produced it. Edges point child → parent, so the
//! structure is a forest rooted at the sentinel: message nodes always have
//! a parent (the delivery being processed when they were sent, or the root
//! for external injections), while partition and quiescence markers are
//! inserted without parent edges.
//!
//! Nodes live in an arena indexed by [`EventId`]; all path queries are
//! plain id walks. The graph persists across interleavings — ids allocated
//! in one run keep addressing the same logical event in every later run.
//!
//! Each node also carries its quiescence-epoch tag, re-stamped whenever
//! the event is re-produced during a replay.

use crate::event::{Event, Unique};
use crate::types::{EventId, QuiescentEpoch};
use smallvec::SmallVec;

#[derive(Debug)]
struct Node {
    unique: Unique,
    parent: Option<EventId>,
    children: SmallVec<[EventId; 4]>,
    epoch: QuiescentEpoch,
}

/// Arena-backed dependency graph with child → parent edges.
#[derive(Debug)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
}

impl DependencyGraph {
    /// Create a graph containing only the root sentinel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                unique: Unique::root(),
                parent: None,
                children: SmallVec::new(),
                epoch: QuiescentEpoch::INITIAL,
            }],
        }
    }

    /// Number of nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root sentinel is permanent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// True if the id addresses a node.
    #[must_use]
    pub fn contains(&self, id: EventId) -> bool {
        (id.raw() as usize) < self.nodes.len()
    }

    fn node(&self, id: EventId) -> Option<&Node> {
        self.nodes.get(id.raw() as usize)
    }

    /// The unique event stored at `id`.
    #[must_use]
    pub fn unique(&self, id: EventId) -> Option<&Unique> {
        self.node(id).map(|n| &n.unique)
    }

    /// Parent id of `id`, `None` for the root and detached markers.
    #[must_use]
    pub fn parent(&self, id: EventId) -> Option<EventId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Child ids of `id` in production order.
    #[must_use]
    pub fn children(&self, id: EventId) -> &[EventId] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    /// Quiescence-epoch tag of `id`.
    #[must_use]
    pub fn epoch(&self, id: EventId) -> Option<QuiescentEpoch> {
        self.node(id).map(|n| n.epoch)
    }

    /// Re-stamp the epoch tag of `id` (the event was re-produced in the
    /// current run).
    pub fn set_epoch(&mut self, id: EventId, epoch: QuiescentEpoch) {
        if let Some(node) = self.nodes.get_mut(id.raw() as usize) {
            node.epoch = epoch;
        }
    }

    /// Insert a new node as a child of `parent` and return its allocated
    /// id (monotone, dense).
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not in the graph; the caller holds the
    /// parent-event cursor and cannot observe a dangling id.
    pub fn add_child(&mut self, parent: EventId, event: Event, epoch: QuiescentEpoch) -> EventId {
        assert!(self.contains(parent), "parent {parent} not in graph");
        let id = EventId::new(self.nodes.len() as u64);
        self.nodes.push(Node {
            unique: Unique::new(event, id),
            parent: Some(parent),
            children: SmallVec::new(),
            epoch,
        });
        self.nodes[parent.raw() as usize].children.push(id);
        id
    }

    /// Insert a parentless node (partition or quiescence marker) and
    /// return its allocated id.
    pub fn add_detached(&mut self, event: Event, epoch: QuiescentEpoch) -> EventId {
        let id = EventId::new(self.nodes.len() as u64);
        self.nodes.push(Node {
            unique: Unique::new(event, id),
            parent: None,
            children: SmallVec::new(),
            epoch,
        });
        id
    }

    /// Unique events of the children of `parent`, in production order.
    pub fn siblings(&self, parent: EventId) -> impl Iterator<Item = &Unique> {
        self.children(parent)
            .iter()
            .filter_map(move |&child| self.unique(child))
    }

    /// Distance from `id` to the terminal node of its parent chain.
    ///
    /// For message nodes the chain ends at the root, so this is the
    /// delivery depth; detached markers have depth `0`.
    #[must_use]
    pub fn depth(&self, id: EventId) -> usize {
        let mut depth = 0;
        let mut cursor = id;
        while let Some(parent) = self.parent(cursor) {
            depth += 1;
            cursor = parent;
        }
        depth
    }

    /// Id path from `id` to the end of its parent chain, inclusive at
    /// both ends.
    #[must_use]
    pub fn path_to_root(&self, id: EventId) -> Vec<EventId> {
        let mut path = vec![id];
        let mut cursor = id;
        while let Some(parent) = self.parent(cursor) {
            path.push(parent);
            cursor = parent;
        }
        path
    }

    /// True if `ancestor` lies on the parent chain of `id` (or equals it).
    #[must_use]
    pub fn is_ancestor_of(&self, ancestor: EventId, id: EventId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Deepest node shared by the parent chains of `a` and `b`.
    ///
    /// Both chains end at the root for message nodes, so a shared node
    /// always exists for a pair of deliveries; `None` only if a chain is
    /// detached.
    #[must_use]
    pub fn last_shared_ancestor(&self, a: EventId, b: EventId) -> Option<EventId> {
        let b_chain: Vec<EventId> = self.path_to_root(b);
        self.path_to_root(a)
            .into_iter()
            .find(|id| b_chain.contains(id))
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
