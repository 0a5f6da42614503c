/// Number of hash bits a single directory node can consume.
pub const MAX_LEVEL_DEPTH: u8 = 8;

/// Number of slots in every directory node.
pub const MAX_LEVEL_SIZE: usize = 1 << MAX_LEVEL_DEPTH;

/// Hashes are 64 bits wide, so no bucket can be deeper than this.
pub const MAX_HASH_DEPTH: u8 = 64;

/// A bucket is considered for merging once it holds at most this fraction of its capacity.
pub const MERGE_THRESHOLD: f64 = 0.2;

pub const HASH_SEED: u64 = 362498820;

pub const BUCKET_FILE_EXTENSION: &str = "obf";

pub const TREE_STATE_FILE_EXTENSION: &str = "tsc";

pub const DEFAULT_PAGE_SIZE: usize = 4096;

pub const DEFAULT_BUCKET_CAPACITY: usize = 64;

/// depth (1) + flags (1) + entry count (2) + next free page (8)
pub const BUCKET_HEADER: usize = 12;

/// key length (2) + cluster id (2) + cluster position (8)
pub const ENTRY_OVERHEAD: usize = 12;

/// local depth (1) + max left child depth (1) + max right child depth (1)
pub const NODE_HEADER: usize = 3;

pub const NODE_RECORD_SIZE: usize = NODE_HEADER + MAX_LEVEL_SIZE * 8;

/// Number of i64 scalars kept in a page store header.
pub const HEADER_SLOTS: usize = 8;

pub const HEADER_SIZE: usize = HEADER_SLOTS * 8;

pub const HEADER_SIZE_SLOT: usize = 0;
pub const HEADER_TREE_SIZE_SLOT: usize = 1;
pub const HEADER_TREE_TOMBSTONE_SLOT: usize = 2;
pub const HEADER_BUCKET_TOMBSTONE_SLOT: usize = 3;
pub const HEADER_IDENTITY_HIGH_SLOT: usize = 4;
pub const HEADER_IDENTITY_LOW_SLOT: usize = 5;
pub const HEADER_PAGE_SIZE_SLOT: usize = 6;
pub const HEADER_CAPACITY_SLOT: usize = 7;
