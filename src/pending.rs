//! Pending-events map: per-receiver delivery lanes.
//!
//! Deliverable envelopes wait in FIFO lanes, one per receiving actor,
//! plus two reserved lanes:
//!
//! - `PRIORITY` — decomposed partition notifications that must fire
//!   before any user message.
//! - `SCHEDULER` — partition and quiescence markers consumed by the
//!   driver itself.
//!
//! Within a lane, order is FIFO. Across lanes, the divergent scheduling
//! step pops from the first non-empty lane under a fixed iteration order
//! ([`LaneOrder`]); lanes are created on first use.

use crate::config::LaneOrder;
use crate::event::Unique;
use crate::runtime::{CellRef, Envelope};
use crate::types::{ActorName, EventId};
use std::collections::VecDeque;
use std::fmt;

/// Lane key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaneId {
    /// Partition notifications; always drained first.
    Priority,
    /// Partition and quiescence markers.
    Scheduler,
    /// User deliveries for the named receiver.
    Actor(ActorName),
}

impl LaneId {
    /// Rank for lexicographic lane ordering: reserved lanes first, then
    /// actor lanes by receiver name.
    fn rank(&self) -> (u8, Option<&ActorName>) {
        match self {
            Self::Priority => (0, None),
            Self::Scheduler => (1, None),
            Self::Actor(name) => (2, Some(name)),
        }
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Priority => f.write_str("PRIORITY"),
            Self::Scheduler => f.write_str("SCHEDULER"),
            Self::Actor(name) => write!(f, "{name}"),
        }
    }
}

/// An entry waiting in a lane.
#[derive(Debug, Clone)]
pub enum Pending {
    /// A user delivery with a stable identity.
    Message {
        /// Identity of the delivery.
        unique: Unique,
        /// Target cell.
        cell: CellRef,
        /// The envelope to deliver.
        envelope: Envelope,
    },
    /// A partition notification on the priority lane; carries no
    /// identity and never appears in traces.
    Control {
        /// Target cell.
        cell: CellRef,
        /// The notification envelope.
        envelope: Envelope,
    },
    /// A partition or quiescence marker on the scheduler lane.
    Marker {
        /// The marker event.
        unique: Unique,
    },
}

impl Pending {
    /// Identity of the entry, if it has one.
    #[must_use]
    pub fn unique(&self) -> Option<&Unique> {
        match self {
            Self::Message { unique, .. } | Self::Marker { unique } => Some(unique),
            Self::Control { .. } => None,
        }
    }

    /// Identity id of the entry, if it has one.
    #[must_use]
    pub fn unique_id(&self) -> Option<EventId> {
        self.unique().map(|u| u.id)
    }
}

/// The pending-events map.
#[derive(Debug)]
pub struct PendingEvents {
    lanes: Vec<(LaneId, VecDeque<Pending>)>,
    order: LaneOrder,
}

impl PendingEvents {
    /// Empty map with the given lane iteration order.
    #[must_use]
    pub fn new(order: LaneOrder) -> Self {
        Self {
            lanes: Vec::new(),
            order,
        }
    }

    fn lane_position(&self, lane: &LaneId) -> Option<usize> {
        self.lanes.iter().position(|(id, _)| id == lane)
    }

    fn lane_index_or_create(&mut self, lane: LaneId) -> usize {
        if let Some(idx) = self.lane_position(&lane) {
            return idx;
        }
        let at = match self.order {
            LaneOrder::Insertion => self.lanes.len(),
            LaneOrder::Lexicographic => self
                .lanes
                .iter()
                .position(|(id, _)| id.rank() > lane.rank())
                .unwrap_or(self.lanes.len()),
        };
        self.lanes.insert(at, (lane, VecDeque::new()));
        at
    }

    /// Append an entry to the back of a lane.
    ///
    /// Duplicate unique ids across lanes violate the map's contract; the
    /// caller checks [`contains_id`] first where duplicates are possible.
    ///
    /// [`contains_id`]: Self::contains_id
    pub fn push(&mut self, lane: LaneId, entry: Pending) {
        debug_assert!(
            entry
                .unique_id()
                .map_or(true, |id| id.is_noise() || !self.contains_id(id)),
            "duplicate unique id across pending lanes"
        );
        let idx = self.lane_index_or_create(lane);
        self.lanes[idx].1.push_back(entry);
    }

    /// Pop the head of the given lane.
    pub fn pop_front(&mut self, lane: &LaneId) -> Option<Pending> {
        let idx = self.lane_position(lane)?;
        self.lanes[idx].1.pop_front()
    }

    /// Remove and return the first entry of `lane` satisfying `pred`.
    pub fn take_matching(
        &mut self,
        lane: &LaneId,
        pred: impl Fn(&Pending) -> bool,
    ) -> Option<Pending> {
        let idx = self.lane_position(lane)?;
        let queue = &mut self.lanes[idx].1;
        let at = queue.iter().position(pred)?;
        queue.remove(at)
    }

    /// Remove the entry at `position` within `lane`.
    pub fn remove_at(&mut self, lane: &LaneId, position: usize) -> Option<Pending> {
        let idx = self.lane_position(lane)?;
        self.lanes[idx].1.remove(position)
    }

    /// Entries of a lane, front to back.
    pub fn lane_entries(&self, lane: &LaneId) -> impl Iterator<Item = &Pending> {
        self.lane_position(lane)
            .into_iter()
            .flat_map(move |idx| self.lanes[idx].1.iter())
    }

    /// Remove and return the first message entry (in lane iteration
    /// order) whose envelope satisfies `pred`.
    pub fn take_message_where(&mut self, pred: impl Fn(&Envelope) -> bool) -> Option<Pending> {
        for (_, queue) in &mut self.lanes {
            let at = queue.iter().position(|entry| {
                matches!(entry, Pending::Message { envelope, .. } if pred(envelope))
            });
            if let Some(at) = at {
                return queue.remove(at);
            }
        }
        None
    }

    /// Pop the head of the first non-empty lane in iteration order.
    ///
    /// With `skip_scheduler`, marker entries are left alone (used while
    /// awaiting quiescence, when no new barrier or partition may fire).
    pub fn pop_any(&mut self, skip_scheduler: bool) -> Option<Pending> {
        let idx = self
            .lanes
            .iter()
            .position(|(id, queue)| !queue.is_empty() && !(skip_scheduler && *id == LaneId::Scheduler))?;
        self.lanes[idx].1.pop_front()
    }

    /// True if any lane holds an entry with this unique id.
    #[must_use]
    pub fn contains_id(&self, id: EventId) -> bool {
        self.lanes
            .iter()
            .flat_map(|(_, queue)| queue.iter())
            .any(|entry| entry.unique_id() == Some(id))
    }

    /// Total entries across all lanes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.iter().map(|(_, queue)| queue.len()).sum()
    }

    /// True if no lane holds an entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(|(_, queue)| queue.is_empty())
    }

    /// True if entries remain outside the scheduler lane.
    #[must_use]
    pub fn has_deliverable(&self) -> bool {
        self.lanes
            .iter()
            .any(|(id, queue)| *id != LaneId::Scheduler && !queue.is_empty())
    }

    /// Drop all entries; lane registrations are forgotten too, so the
    /// next run rebuilds iteration order from its own arrival sequence.
    pub fn clear(&mut self) {
        self.lanes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, MsgEvent, Payload};

    fn entry(id: u64, sender: &str, receiver: &str) -> Pending {
        let envelope = Envelope::new(sender, Payload::user(b"m".as_slice()));
        Pending::Message {
            unique: Unique::new(
                Event::Message(MsgEvent {
                    sender: sender.into(),
                    receiver: receiver.into(),
                    payload: envelope.payload.clone(),
                }),
                EventId::new(id),
            ),
            cell: CellRef::new(receiver),
            envelope,
        }
    }

    #[test]
    fn fifo_within_lane() {
        let mut pending = PendingEvents::new(LaneOrder::Insertion);
        let lane = LaneId::Actor("c".into());
        pending.push(lane.clone(), entry(1, "a", "c"));
        pending.push(lane.clone(), entry(2, "a", "c"));
        assert_eq!(pending.pop_front(&lane).unwrap().unique_id(), Some(EventId::new(1)));
        assert_eq!(pending.pop_front(&lane).unwrap().unique_id(), Some(EventId::new(2)));
    }

    #[test]
    fn insertion_order_across_lanes() {
        let mut pending = PendingEvents::new(LaneOrder::Insertion);
        pending.push(LaneId::Actor("zeta".into()), entry(1, "a", "zeta"));
        pending.push(LaneId::Actor("alpha".into()), entry(2, "a", "alpha"));
        // zeta's lane was created first, so pop_any drains it first.
        assert_eq!(pending.pop_any(false).unwrap().unique_id(), Some(EventId::new(1)));
        assert_eq!(pending.pop_any(false).unwrap().unique_id(), Some(EventId::new(2)));
    }

    #[test]
    fn lexicographic_order_across_lanes() {
        let mut pending = PendingEvents::new(LaneOrder::Lexicographic);
        pending.push(LaneId::Actor("zeta".into()), entry(1, "a", "zeta"));
        pending.push(LaneId::Actor("alpha".into()), entry(2, "a", "alpha"));
        assert_eq!(pending.pop_any(false).unwrap().unique_id(), Some(EventId::new(2)));
        assert_eq!(pending.pop_any(false).unwrap().unique_id(), Some(EventId::new(1)));
    }

    #[test]
    fn skip_scheduler_leaves_markers() {
        let mut pending = PendingEvents::new(LaneOrder::Insertion);
        pending.push(
            LaneId::Scheduler,
            Pending::Marker {
                unique: Unique::new(Event::Quiescence, EventId::new(5)),
            },
        );
        assert!(pending.pop_any(true).is_none());
        assert!(pending.pop_any(false).is_some());
    }

    #[test]
    fn contains_id_sees_all_lanes() {
        let mut pending = PendingEvents::new(LaneOrder::Insertion);
        pending.push(LaneId::Actor("c".into()), entry(4, "a", "c"));
        assert!(pending.contains_id(EventId::new(4)));
        assert!(!pending.contains_id(EventId::new(5)));
    }
}
