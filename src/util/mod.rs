//! Internal utilities.

pub mod det_hash;

pub use det_hash::{fingerprint_bytes, DetHasher};
