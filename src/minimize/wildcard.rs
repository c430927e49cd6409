//! Ambiguity resolution for wildcard replay.
//!
//! When a wildcard step matches more than one pending message, a strategy
//! decides which to dispatch — and whether the alternatives are worth
//! revisiting. A strategy is a small capability: given the predicate and
//! the pending queue, return the index to dispatch and optionally
//! register backtrack indices for DPOR to retry later.
//!
//! Candidates with equal payload fingerprints are interchangeable, so
//! strategies deduplicate registrations by fingerprint.

use crate::event::Unique;
use crate::trace::WildCard;
use crate::types::Fingerprint;
use std::fmt;

/// Pick a pending message for a wildcard step.
///
/// `pending` is the receiver's lane, front to back. `register_backtrack`
/// records an alternative index the engine should come back to.
pub trait AmbiguityResolver: fmt::Debug {
    /// Resolve the wildcard, or give up with `None`.
    fn resolve(
        &self,
        wildcard: &WildCard,
        pending: &[&Unique],
        register_backtrack: &mut dyn FnMut(usize),
    ) -> Option<usize>;
}

fn fingerprint_of(unique: &Unique) -> Option<Fingerprint> {
    unique.message().map(|msg| msg.payload.fingerprint())
}

fn matching_indices(wildcard: &WildCard, pending: &[&Unique]) -> Vec<usize> {
    pending
        .iter()
        .enumerate()
        .filter(|(_, unique)| wildcard.matches(unique))
        .map(|(idx, _)| idx)
        .collect()
}

/// Match only if the head of the pending queue satisfies the predicate;
/// otherwise give up this delivery.
///
/// Preserves per-link FIFO order exactly; never registers backtracks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SrcDstFifoOnly;

impl AmbiguityResolver for SrcDstFifoOnly {
    fn resolve(
        &self,
        wildcard: &WildCard,
        pending: &[&Unique],
        _register_backtrack: &mut dyn FnMut(usize),
    ) -> Option<usize> {
        match pending.first() {
            Some(head) if wildcard.matches(head) => Some(0),
            _ => None,
        }
    }
}

/// Dispatch the first match; register every later match with a distinct
/// fingerprint as a backtrack point, in reversed order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackTrackStrategy;

impl AmbiguityResolver for BackTrackStrategy {
    fn resolve(
        &self,
        wildcard: &WildCard,
        pending: &[&Unique],
        register_backtrack: &mut dyn FnMut(usize),
    ) -> Option<usize> {
        let matched = matching_indices(wildcard, pending);
        let &chosen = matched.first()?;
        let mut seen: Vec<Option<Fingerprint>> = vec![fingerprint_of(pending[chosen])];
        for &idx in matched.iter().skip(1).rev() {
            let fp = fingerprint_of(pending[idx]);
            if !seen.contains(&fp) {
                seen.push(fp);
                register_backtrack(idx);
            }
        }
        Some(chosen)
    }
}

/// Dispatch the first match; register a single backtrack — the last
/// match whose fingerprint differs from the chosen one.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAndLastBacktrack;

impl AmbiguityResolver for FirstAndLastBacktrack {
    fn resolve(
        &self,
        wildcard: &WildCard,
        pending: &[&Unique],
        register_backtrack: &mut dyn FnMut(usize),
    ) -> Option<usize> {
        let matched = matching_indices(wildcard, pending);
        let &chosen = matched.first()?;
        let chosen_fp = fingerprint_of(pending[chosen]);
        if let Some(&last) = matched
            .iter()
            .skip(1)
            .rev()
            .find(|&&idx| fingerprint_of(pending[idx]) != chosen_fp)
        {
            register_backtrack(last);
        }
        Some(chosen)
    }
}

/// Dispatch only the last matching pending message; never backtrack.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastOnlyStrategy;

impl AmbiguityResolver for LastOnlyStrategy {
    fn resolve(
        &self,
        wildcard: &WildCard,
        pending: &[&Unique],
        _register_backtrack: &mut dyn FnMut(usize),
    ) -> Option<usize> {
        matching_indices(wildcard, pending).last().copied()
    }
}
