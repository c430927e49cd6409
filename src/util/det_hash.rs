//! Deterministic hashing for cross-run fingerprints.
//!
//! Payload and violation fingerprints must be stable across processes,
//! platforms, and runs; the standard library's `DefaultHasher` is seeded
//! per-process and cannot be used. This hasher uses a fixed seed and a
//! simple multiply-xor mixing strategy.

use crate::types::Fingerprint;
use std::hash::{Hash, Hasher};

/// Deterministic, non-cryptographic hasher with a fixed seed.
#[derive(Debug, Clone)]
pub struct DetHasher {
    state: u64,
}

impl DetHasher {
    /// Fixed seed ensures deterministic hashes across runs.
    const SEED: u64 = 0x51ce_97a3_0d4f_b2e1;
    /// Prime multiplier for mixing.
    const MULTIPLIER: u64 = 0x517c_c1b7_2722_0a95;

    #[inline]
    fn mix_byte(&mut self, byte: u8) {
        self.state = self.state.wrapping_mul(Self::MULTIPLIER);
        self.state ^= u64::from(byte);
    }

    /// Finalize into a [`Fingerprint`].
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(self.finish())
    }
}

impl Default for DetHasher {
    fn default() -> Self {
        Self { state: Self::SEED }
    }
}

impl Hasher for DetHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.mix_byte(byte);
        }
    }

    fn write_u8(&mut self, i: u8) {
        self.mix_byte(i);
    }

    fn write_u64(&mut self, i: u64) {
        for byte in i.to_le_bytes() {
            self.mix_byte(byte);
        }
    }

    fn write_usize(&mut self, i: usize) {
        // Width-independent: always hash as u64.
        self.write_u64(i as u64);
    }
}

/// Fingerprint a byte slice with the deterministic hasher.
#[must_use]
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    let mut hasher = DetHasher::default();
    bytes.hash(&mut hasher);
    hasher.fingerprint()
}
