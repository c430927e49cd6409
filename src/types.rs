//! Core identifier types.
//!
//! Identifiers are small, cheaply cloneable values used as keys throughout
//! the engine. Actor names are reference-counted strings (receiver lanes,
//! partition maps, and envelopes all share them); event ids are plain
//! integers allocated monotonically by the dependency graph.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// ActorName
// ---------------------------------------------------------------------------

/// Name of an actor endpoint.
///
/// Names are the unit of addressing: receiver lanes, the partition map, and
/// trace matching all key on them. Backed by `Arc<str>` so clones are
/// pointer-sized.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorName(Arc<str>);

impl ActorName {
    /// Create an actor name.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ActorName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl Borrow<str> for ActorName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for ActorName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ActorName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

// ---------------------------------------------------------------------------
// EventId
// ---------------------------------------------------------------------------

/// Identity of a logical event, stable across interleavings.
///
/// Ids are allocated monotonically by the dependency graph. Id `0` is
/// reserved for the root sentinel and for "noise" events that the trace
/// matcher treats as wildcards on the receiver name alone.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct EventId(u64);

impl EventId {
    /// The root sentinel / noise id.
    pub const ROOT: Self = Self(0);

    /// Create an event id from a raw integer.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// True for the root sentinel and system-noise events.
    #[must_use]
    pub const fn is_noise(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// QuiescentEpoch
// ---------------------------------------------------------------------------

/// Quiescence epoch tag.
///
/// Every graph node is tagged with the epoch in which it was produced; two
/// events belong to the same liveness window iff their tags match. The tag
/// value is the id of the quiescence marker that opened the epoch (`0`
/// before the first barrier).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct QuiescentEpoch(u64);

impl QuiescentEpoch {
    /// The epoch before any quiescence barrier has committed.
    pub const INITIAL: Self = Self(0);

    /// Epoch opened by the quiescence marker with the given id.
    #[must_use]
    pub const fn opened_by(marker: EventId) -> Self {
        Self(marker.raw())
    }

    /// Returns the raw epoch value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for QuiescentEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// Opaque, equality-comparable digest.
///
/// Fingerprints identify "the same" payload or violation across runs.
/// Produced by the deterministic hasher in [`crate::util`], so values are
/// stable across processes and platforms.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Create a fingerprint from a raw digest value.
    #[must_use]
    pub const fn new(digest: u64) -> Self {
        Self(digest)
    }

    /// Returns the raw digest.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
