//! Deterministic RNG hierarchy.
//!
//! A master seed generates deterministic sub-seeds for each `(stream, key)`
//! pair, e.g. `("macro", "GDP")` or `("speeches", "US")`. Sub-seeds are
//! derived via BLAKE3 hashing, independently of the order in which streams
//! are requested, so adding a series never perturbs the others.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedHierarchy {
    master_seed: u64,
}

impl SeedHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive a deterministic sub-seed for a `(stream, key)` pair.
    pub fn sub_seed(&self, stream: &str, key: &str) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(stream.as_bytes());
        // Separator keeps ("ab", "c") and ("a", "bc") apart.
        hasher.update(&[0]);
        hasher.update(key.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Create a seeded StdRng for a `(stream, key)` pair.
    pub fn rng_for(&self, stream: &str, key: &str) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(stream, key))
    }
}
