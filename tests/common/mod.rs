#![allow(dead_code)]

use ehindex::{HashIndex, IndexConfig, KeyHasher, MemoryPageStore};

/// Routes `Key::Int` keys by their own bits, so a test chooses exactly which
/// directory slots its keys land in.
///
/// An int key encodes as a tag byte followed by the value in big endian, so
/// the last eight bytes are the value.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntBits;

impl KeyHasher for IntBits {
    fn hash(&self, bytes: &[u8]) -> u64 {
        let mut buf = [0; 8];
        let tail = &bytes[bytes.len().saturating_sub(8)..];
        buf[8 - tail.len()..].copy_from_slice(tail);
        u64::from_be_bytes(buf)
    }
}

/// Small pages and four entries per bucket so a few dozen keys already
/// restructure the directory.
pub fn small_config() -> IndexConfig {
    IndexConfig::new("test").page_size(512).bucket_capacity(4)
}

pub async fn small_index() -> HashIndex<MemoryPageStore, IntBits> {
    HashIndex::in_memory_with_hasher(small_config(), IntBits)
        .await
        .unwrap()
}

/// A key whose top byte is `top` and whose next bits are `rest`.
pub fn key_under(top: u8, rest: u64) -> i64 {
    (((top as u64) << 56) | (rest & ((1 << 56) - 1))) as i64
}
