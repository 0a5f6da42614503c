use std::fmt;

use crate::error::{IndexError, Result};

/// A directory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Pointer {
    /// Never assigned. A healthy directory has none of these.
    #[default]
    Empty,
    /// Page index of a bucket.
    Bucket(u64),
    /// A hashmap inside a child node, starting at slot `offset`.
    Node { index: u32, offset: u8 },
}

impl Pointer {
    pub fn is_node(&self) -> bool {
        matches!(self, Pointer::Node { .. })
    }

    /// Packed form used in the tree state file.
    ///
    /// Buckets are stored as their byte position in the bucket file plus one
    /// so that zero stays free for [`Pointer::Empty`]. Child references set the
    /// sign bit and keep the node index above the low 8 bits holding the offset.
    pub fn pack(&self, page_size: usize) -> i64 {
        match *self {
            Pointer::Empty => 0,
            Pointer::Bucket(id) => (id * page_size as u64 + 1) as i64,
            Pointer::Node { index, offset } => i64::MIN | ((index as i64) << 8) | offset as i64,
        }
    }

    pub fn unpack(raw: i64, page_size: usize) -> Result<Self> {
        if raw == 0 {
            return Ok(Pointer::Empty);
        }
        if raw < 0 {
            let body = raw & i64::MAX;
            let index = body >> 8;
            if index > u32::MAX as i64 {
                return Err(IndexError::Corrupted(format!(
                    "child pointer {:#x} names node {}",
                    raw, index
                )));
            }
            return Ok(Pointer::Node {
                index: index as u32,
                offset: (body & 0xff) as u8,
            });
        }
        let position = (raw - 1) as u64;
        if position % page_size as u64 != 0 {
            return Err(IndexError::Corrupted(format!(
                "bucket pointer {} is not page aligned",
                raw
            )));
        }
        Ok(Pointer::Bucket(position / page_size as u64))
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pointer::Empty => write!(f, "empty"),
            Pointer::Bucket(id) => write!(f, "bucket {}", id),
            Pointer::Node { index, offset } => write!(f, "node {}+{}", index, offset),
        }
    }
}
