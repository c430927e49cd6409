//! Event model: tagged event variants and stable identities.
//!
//! Every observable action in a run is an [`Event`]; pairing an event with
//! a monotonically allocated id yields a [`Unique`], the stable identity
//! DPOR uses to address the same logical delivery across runs.
//!
//! # Identity rules
//!
//! - Id `0` marks the root sentinel and system-noise events.
//! - Two message events with id `0` compare equal iff their receivers
//!   match; all other comparisons are by id.
//! - Timer-marker payloads compare by `(receiver, timer name, inner
//!   message, repeating)` only — the transient token a timer wheel
//!   attaches to each registration is ignored, so the "same" timer matches
//!   across runs.

use crate::types::{ActorName, EventId, Fingerprint};
use crate::util::DetHasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A user-level message payload.
///
/// The engine never interprets `bytes`; equality is structural. The
/// optional logical clock and the clock-increment flag come from the
/// application protocol and drive the clock-cluster minimizer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserPayload {
    /// Serialized message content (user-supplied serializer).
    pub bytes: Vec<u8>,
    /// Logical clock value, if the protocol carries one.
    pub clock: Option<u64>,
    /// True for messages that advance the protocol's logical clock
    /// (timer ticks, heartbeat rounds).
    pub causes_clock_increment: bool,
}

/// A timer registration delivered as a message.
///
/// Equality and hashing ignore `token`: the token is a transient handle
/// allocated per registration and differs between runs even when the
/// timer is logically the same.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerMarker {
    /// Actor the timer fires at.
    pub receiver: ActorName,
    /// Name of the timer within the receiving actor.
    pub timer_name: String,
    /// Fingerprint of the message delivered when the timer fires.
    pub message: Fingerprint,
    /// Periodic timers re-arm after firing.
    pub repeating: bool,
    /// Transient registration token (not part of identity).
    pub token: u64,
}

impl PartialEq for TimerMarker {
    fn eq(&self, other: &Self) -> bool {
        self.receiver == other.receiver
            && self.timer_name == other.timer_name
            && self.message == other.message
            && self.repeating == other.repeating
    }
}

impl Eq for TimerMarker {}

impl Hash for TimerMarker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.receiver.hash(state);
        self.timer_name.hash(state);
        self.message.hash(state);
        self.repeating.hash(state);
    }
}

/// Partition notification delivered to an actor: the listed peers are now
/// unreachable from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodesUnreachable {
    /// Peers that became unreachable, sorted by name.
    pub unreachable: Vec<ActorName>,
}

impl NodesUnreachable {
    /// Build a notification with a canonical (sorted) peer list.
    #[must_use]
    pub fn new(mut unreachable: Vec<ActorName>) -> Self {
        unreachable.sort();
        Self { unreachable }
    }
}

/// Message payload: user content, a timer marker, or a partition
/// notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Payload {
    /// Application message.
    User(UserPayload),
    /// Timer registration / firing marker.
    Timer(TimerMarker),
    /// Partition-broadcast notification.
    Unreachable(NodesUnreachable),
}

impl Payload {
    /// An application payload without a logical clock.
    #[must_use]
    pub fn user(bytes: impl Into<Vec<u8>>) -> Self {
        Self::User(UserPayload {
            bytes: bytes.into(),
            clock: None,
            causes_clock_increment: false,
        })
    }

    /// An application payload tagged with a logical clock value.
    #[must_use]
    pub fn user_clocked(bytes: impl Into<Vec<u8>>, clock: u64) -> Self {
        Self::User(UserPayload {
            bytes: bytes.into(),
            clock: Some(clock),
            causes_clock_increment: false,
        })
    }

    /// A clock-incrementing payload (timer tick, heartbeat round).
    #[must_use]
    pub fn clock_increment(bytes: impl Into<Vec<u8>>) -> Self {
        Self::User(UserPayload {
            bytes: bytes.into(),
            clock: None,
            causes_clock_increment: true,
        })
    }

    /// True for timer-marker payloads.
    #[must_use]
    pub const fn is_timer_marker(&self) -> bool {
        matches!(self, Self::Timer(_))
    }

    /// Logical clock value, if present.
    #[must_use]
    pub fn clock(&self) -> Option<u64> {
        match self {
            Self::User(user) => user.clock,
            Self::Timer(_) | Self::Unreachable(_) => None,
        }
    }

    /// True if delivering this payload advances the logical clock.
    #[must_use]
    pub fn causes_clock_increment(&self) -> bool {
        match self {
            Self::User(user) => user.causes_clock_increment,
            Self::Timer(_) => true,
            Self::Unreachable(_) => false,
        }
    }

    /// Deterministic digest of the payload content.
    ///
    /// Timer markers hash their identity fields only (token excluded), so
    /// the fingerprint is stable across runs.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = DetHasher::default();
        match self {
            Self::User(user) => {
                0u8.hash(&mut hasher);
                user.bytes.hash(&mut hasher);
                user.clock.hash(&mut hasher);
                user.causes_clock_increment.hash(&mut hasher);
            }
            Self::Timer(timer) => {
                1u8.hash(&mut hasher);
                timer.hash(&mut hasher);
            }
            Self::Unreachable(nodes) => {
                2u8.hash(&mut hasher);
                nodes.hash(&mut hasher);
            }
        }
        hasher.fingerprint()
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A single message delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MsgEvent {
    /// Sending actor.
    pub sender: ActorName,
    /// Receiving actor.
    pub receiver: ActorName,
    /// Message content.
    pub payload: Payload,
}

/// A bidirectional network partition between two actor groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionEvent {
    /// First group, sorted by name.
    pub group_a: Vec<ActorName>,
    /// Second group, sorted by name.
    pub group_b: Vec<ActorName>,
}

impl PartitionEvent {
    /// Build a partition with canonical (sorted) groups.
    #[must_use]
    pub fn new(mut group_a: Vec<ActorName>, mut group_b: Vec<ActorName>) -> Self {
        group_a.sort();
        group_b.sort();
        Self { group_a, group_b }
    }
}

/// Tagged event variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    /// Sentinel parent of all externally injected deliveries.
    Root,
    /// A message delivery.
    Message(MsgEvent),
    /// A bidirectional network partition.
    Partition(PartitionEvent),
    /// Barrier: wait until the system is idle.
    Quiescence,
    /// Actor creation. Observed only; never scheduled.
    Spawn(ActorName),
}

impl Event {
    /// Stable, grep-friendly kind name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Message(_) => "message",
            Self::Partition(_) => "partition",
            Self::Quiescence => "quiescence",
            Self::Spawn(_) => "spawn",
        }
    }
}

// ---------------------------------------------------------------------------
// Unique
// ---------------------------------------------------------------------------

/// An event paired with its stable identity.
///
/// Equality follows the identity rules in the module docs: by id, except
/// that two noise (`id = 0`) message events compare by receiver alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unique {
    /// The event.
    pub event: Event,
    /// Stable identity, `0` for the root sentinel and noise events.
    pub id: EventId,
}

impl Unique {
    /// The root sentinel, id `0`.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            event: Event::Root,
            id: EventId::ROOT,
        }
    }

    /// Pair an event with an id.
    #[must_use]
    pub const fn new(event: Event, id: EventId) -> Self {
        Self { event, id }
    }

    /// The message event, if this is a delivery.
    #[must_use]
    pub const fn message(&self) -> Option<&MsgEvent> {
        match &self.event {
            Event::Message(msg) => Some(msg),
            _ => None,
        }
    }

    /// Receiver name, if this is a delivery.
    #[must_use]
    pub fn receiver(&self) -> Option<&ActorName> {
        self.message().map(|msg| &msg.receiver)
    }

    /// True for message deliveries.
    #[must_use]
    pub const fn is_message(&self) -> bool {
        matches!(self.event, Event::Message(_))
    }

    /// True for partition events.
    #[must_use]
    pub const fn is_partition(&self) -> bool {
        matches!(self.event, Event::Partition(_))
    }

    /// True for quiescence barriers.
    #[must_use]
    pub const fn is_quiescence(&self) -> bool {
        matches!(self.event, Event::Quiescence)
    }

    /// True for spawn observations.
    #[must_use]
    pub const fn is_spawn(&self) -> bool {
        matches!(self.event, Event::Spawn(_))
    }

    /// Trace-replay equivalence: does a pending delivery satisfy this
    /// trace entry?
    ///
    /// Receivers (for messages) or the full event value (for markers)
    /// must match, and ids must match unless this entry is noise
    /// (id `0`), in which case the value comparison alone decides. Noise
    /// entries let schedules address events whose ids were allocated by a
    /// different engine.
    #[must_use]
    pub fn matches_delivery(&self, pending: &Unique) -> bool {
        if !self.id.is_noise() {
            return match (&self.event, &pending.event) {
                (Event::Message(want), Event::Message(have)) => {
                    want.receiver == have.receiver && self.id == pending.id
                }
                _ => self.id == pending.id,
            };
        }
        match (&self.event, &pending.event) {
            (Event::Message(want), Event::Message(have)) => want.receiver == have.receiver,
            (want, have) => want == have,
        }
    }
}

impl PartialEq for Unique {
    fn eq(&self, other: &Self) -> bool {
        if self.id.is_noise() && other.id.is_noise() {
            match (&self.event, &other.event) {
                (Event::Message(a), Event::Message(b)) => a.receiver == b.receiver,
                (a, b) => a == b,
            }
        } else {
            self.id == other.id
        }
    }
}

impl Eq for Unique {}

impl Hash for Unique {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if self.id.is_noise() {
            match &self.event {
                Event::Message(msg) => {
                    0u8.hash(state);
                    msg.receiver.hash(state);
                }
                event => {
                    1u8.hash(state);
                    event.hash(state);
                }
            }
        } else {
            2u8.hash(state);
            self.id.hash(state);
        }
    }
}

impl fmt::Display for Unique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.event {
            Event::Root => write!(f, "{}:root", self.id),
            Event::Message(msg) => {
                write!(f, "{}:{}→{}", self.id, msg.sender, msg.receiver)
            }
            Event::Partition(p) => {
                write!(
                    f,
                    "{}:partition({} | {})",
                    self.id,
                    p.group_a.len(),
                    p.group_b.len()
                )
            }
            Event::Quiescence => write!(f, "{}:quiescence", self.id),
            Event::Spawn(name) => write!(f, "{}:spawn({name})", self.id),
        }
    }
}

/// Message-payload equivalence used by sibling deduplication.
///
/// Structural equality, with the timer-marker rule folded in via
/// [`TimerMarker`]'s `PartialEq` (tokens ignored).
#[must_use]
pub fn payloads_equivalent(a: &Payload, b: &Payload) -> bool {
    a == b
}
