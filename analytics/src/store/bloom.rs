use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Fixed-capacity Bloom filter used for email-existence lookups.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Size the filter for `capacity` items at the given false-positive rate.
    pub fn with_rate(capacity: usize, error_rate: f64) -> Self {
        let n = capacity.max(1) as f64;
        let p = error_rate.clamp(1e-9, 0.5);
        let ln2 = std::f64::consts::LN_2;
        let num_bits = (-(n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().max(1.0) as u32;
        let words = num_bits.div_ceil(64) as usize;
        Self {
            bits: vec![0; words],
            num_bits,
            num_hashes,
        }
    }

    pub fn insert(&mut self, value: &str) {
        for idx in bit_indices(value, self.num_hashes, self.num_bits) {
            self.bits[(idx / 64) as usize] |= 1u64 << (idx % 64);
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        bit_indices(value, self.num_hashes, self.num_bits)
            .all(|idx| self.bits[(idx / 64) as usize] & (1u64 << (idx % 64)) != 0)
    }
}

// Double hashing: h1 + i * h2.
fn bit_indices(value: &str, num_hashes: u32, num_bits: u64) -> impl Iterator<Item = u64> {
    let h1 = seeded_hash(value, 0x51_7c_c1_b7);
    let h2 = seeded_hash(value, 0x27_22_0a_95) | 1;
    (0..u64::from(num_hashes)).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % num_bits)
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::with_rate(20_000, 0.01)
    }
}

fn seeded_hash(value: &str, seed: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    value.hash(&mut hasher);
    hasher.finish()
}
