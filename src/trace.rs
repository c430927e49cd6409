//! Trace logs: ordered event sequences and their persistence.
//!
//! A [`Trace`] is an ordered sequence of steps. Executed traces contain
//! concrete [`Unique`] events; schedules produced by the minimizer also
//! contain [`WildCard`] steps that match any pending message satisfying a
//! predicate at replay time.
//!
//! Persisted logs preserve receiver names, sender names, payload bytes,
//! and id numbers; two logs replay identically iff their id sequences
//! match. The file format is versioned JSON.

use crate::event::Unique;
use crate::types::{ActorName, EventId, Fingerprint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

/// Current trace-file schema version.
pub const TRACE_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Wildcards
// ---------------------------------------------------------------------------

/// The predicate half of a wildcard step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WildCardKind {
    /// Match a pending delivery to `receiver`. With a fingerprint, only
    /// payloads carrying that digest match; without one, any delivery to
    /// the receiver does, and the ambiguity-resolution strategy decides
    /// among candidates.
    Message {
        /// Receiving actor.
        receiver: ActorName,
        /// Payload digest the pending message must carry, if pinned.
        fingerprint: Option<Fingerprint>,
    },
    /// Match any pending message that advances the logical clock.
    /// Ambiguity-resolution strategies are bypassed for these.
    Timer,
}

/// A message-selector predicate used at replay.
///
/// The minimizer rewrites kept deliveries as wildcards so a shrunk trace
/// still matches even when surrounding removals shifted identities. The
/// optional `origin` remembers which original-trace event the step stands
/// for; replays report unmatched origins back to the minimizer so they
/// are dropped from future candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildCard {
    /// The predicate.
    pub kind: WildCardKind,
    /// Id of the original-trace event this step stands for, if any.
    pub origin: Option<EventId>,
}

impl WildCard {
    /// Wildcard over deliveries to `receiver`, optionally pinned to a
    /// payload fingerprint.
    #[must_use]
    pub fn message(receiver: impl Into<ActorName>, fingerprint: Option<Fingerprint>) -> Self {
        Self {
            kind: WildCardKind::Message {
                receiver: receiver.into(),
                fingerprint,
            },
            origin: None,
        }
    }

    /// Wildcard over clock-incrementing deliveries.
    #[must_use]
    pub const fn timer() -> Self {
        Self {
            kind: WildCardKind::Timer,
            origin: None,
        }
    }

    /// Tag the wildcard with the original-trace event it stands for.
    #[must_use]
    pub fn with_origin(mut self, origin: EventId) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Does a pending delivery satisfy this predicate?
    #[must_use]
    pub fn matches(&self, pending: &Unique) -> bool {
        match &self.kind {
            WildCardKind::Message {
                receiver,
                fingerprint,
            } => pending.message().is_some_and(|msg| {
                msg.receiver == *receiver
                    && fingerprint.map_or(true, |fp| msg.payload.fingerprint() == fp)
            }),
            WildCardKind::Timer => pending
                .message()
                .is_some_and(|msg| msg.payload.causes_clock_increment()),
        }
    }
}

impl fmt::Display for WildCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            WildCardKind::Message {
                receiver,
                fingerprint: Some(fp),
            } => write!(f, "*→{receiver} [{fp}]"),
            WildCardKind::Message {
                receiver,
                fingerprint: None,
            } => write!(f, "*→{receiver}"),
            WildCardKind::Timer => f.write_str("*timer"),
        }
    }
}

// ---------------------------------------------------------------------------
// Steps and traces
// ---------------------------------------------------------------------------

/// One step of a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceStep {
    /// A concrete event with a stable identity.
    Event(Unique),
    /// A wildcard predicate resolved against the pending queue.
    WildCard(WildCard),
}

impl TraceStep {
    /// The concrete event, if this step is one.
    #[must_use]
    pub const fn event(&self) -> Option<&Unique> {
        match self {
            Self::Event(unique) => Some(unique),
            Self::WildCard(_) => None,
        }
    }
}

/// An ordered sequence of schedule steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    steps: Vec<TraceStep>,
}

impl Trace {
    /// Empty trace.
    #[must_use]
    pub const fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Trace of concrete events.
    #[must_use]
    pub fn from_events(events: impl IntoIterator<Item = Unique>) -> Self {
        Self {
            steps: events.into_iter().map(TraceStep::Event).collect(),
        }
    }

    /// Append a step.
    pub fn push(&mut self, step: TraceStep) {
        self.steps.push(step);
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True if the trace has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All steps in order.
    #[must_use]
    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    /// Concrete events in order, skipping wildcards.
    pub fn events(&self) -> impl Iterator<Item = &Unique> {
        self.steps.iter().filter_map(TraceStep::event)
    }

    /// Message deliveries in order (concrete steps only).
    pub fn deliveries(&self) -> impl Iterator<Item = &Unique> {
        self.events().filter(|u| u.is_message())
    }

    /// Number of message-delivery steps, wildcard steps included.
    #[must_use]
    pub fn delivery_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| match step {
                TraceStep::Event(u) => u.is_message(),
                TraceStep::WildCard(_) => true,
            })
            .count()
    }

    /// The id sequence of concrete steps; the replay identity of the log.
    #[must_use]
    pub fn ids(&self) -> Vec<EventId> {
        self.events().map(|u| u.id).collect()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match step {
                TraceStep::Event(unique) => write!(f, "{unique}")?,
                TraceStep::WildCard(wildcard) => write!(f, "{wildcard}")?,
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Errors reading or writing trace files.
#[derive(Debug, Error)]
pub enum TraceFileError {
    /// Underlying I/O failure.
    #[error("trace file I/O: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON or schema mismatch in the body.
    #[error("trace file decode: {0}")]
    Decode(#[from] serde_json::Error),
    /// The file was written by an incompatible schema version.
    #[error("trace file version {found}, expected {expected}")]
    Version {
        /// Version found in the file.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },
}

#[derive(Serialize, Deserialize)]
struct TraceFile {
    version: u32,
    trace: Trace,
}

/// Write a trace log to `path`.
pub fn write_trace(path: impl AsRef<Path>, trace: &Trace) -> Result<(), TraceFileError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer(
        writer,
        &TraceFile {
            version: TRACE_SCHEMA_VERSION,
            trace: trace.clone(),
        },
    )?;
    Ok(())
}

/// Read a trace log from `path`, checking the schema version.
pub fn read_trace(path: impl AsRef<Path>) -> Result<Trace, TraceFileError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let parsed: TraceFile = serde_json::from_reader(reader)?;
    if parsed.version != TRACE_SCHEMA_VERSION {
        return Err(TraceFileError::Version {
            found: parsed.version,
            expected: TRACE_SCHEMA_VERSION,
        });
    }
    Ok(parsed.trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, MsgEvent, Payload};

    fn delivery(id: u64, sender: &str, receiver: &str, bytes: &[u8]) -> Unique {
        Unique::new(
            Event::Message(MsgEvent {
                sender: sender.into(),
                receiver: receiver.into(),
                payload: Payload::user(bytes),
            }),
            EventId::new(id),
        )
    }

    #[test]
    fn id_sequence_is_replay_identity() {
        let trace = Trace::from_events([
            Unique::root(),
            delivery(1, "a", "b", b"m1"),
            delivery(2, "b", "c", b"m2"),
        ]);
        assert_eq!(
            trace.ids(),
            vec![EventId::ROOT, EventId::new(1), EventId::new(2)]
        );
        assert_eq!(trace.delivery_count(), 2);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("violation.trace");
        let mut trace = Trace::from_events([Unique::root(), delivery(1, "a", "b", b"m1")]);
        trace.push(TraceStep::WildCard(
            WildCard::message("b", Some(Payload::user(b"m2".as_slice()).fingerprint()))
                .with_origin(EventId::new(2)),
        ));

        write_trace(&path, &trace).expect("write");
        let loaded = read_trace(&path).expect("read");
        assert_eq!(loaded, trace);
        assert_eq!(loaded.ids(), trace.ids());
    }

    #[test]
    fn version_mismatch_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stale.trace");
        std::fs::write(&path, r#"{"version":99,"trace":{"steps":[]}}"#).expect("write raw");
        let err = read_trace(&path).expect_err("must reject");
        assert!(matches!(
            err,
            TraceFileError::Version {
                found: 99,
                expected: TRACE_SCHEMA_VERSION
            }
        ));
    }
}
