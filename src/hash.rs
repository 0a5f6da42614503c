use twox_hash::XxHash64;

use crate::consts::HASH_SEED;

/// Deterministic 64 bit hash of an encoded key. The directory routes on the
/// most significant bits, so implementations should spread them uniformly.
pub trait KeyHasher: Send + Sync + 'static {
    fn hash(&self, bytes: &[u8]) -> u64;
}

/// XxHash64 with the index's fixed seed.
#[derive(Debug, Clone, Copy, Default)]
pub struct XxHasher;

impl KeyHasher for XxHasher {
    fn hash(&self, bytes: &[u8]) -> u64 {
        XxHash64::oneshot(HASH_SEED, bytes)
    }
}

/// Top `depth` bits of `hash`. `depth` must be between 1 and 64.
pub fn prefix(hash: u64, depth: u8) -> u64 {
    debug_assert!((1..=64).contains(&depth));
    hash >> (64 - depth as u32)
}

/// The bit that decides which half of a split a hash lands in, counting
/// `depth` bits from the top.
pub fn split_bit(hash: u64, depth: u8) -> bool {
    prefix(hash, depth) & 1 == 1
}
