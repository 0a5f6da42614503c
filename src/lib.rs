//! Extendible hashing index mapping encoded keys to record ids.
//!
//! Keys are hashed to 64 bits and routed through a trie of 256-slot directory
//! nodes to fixed-size bucket pages. Full buckets split, underfull buckets
//! merge with their buddy, and directory nodes grow and fold as needed.

mod bucket;
mod bucket_manager;
mod bytes;
mod command;
mod config;
mod consts;
mod directory;
mod error;
mod execute;
mod hash;
mod hash_index;
mod key;
mod node;
mod page_store;
mod parse;
mod pointer;
mod rebuild;
mod repl;
mod setup;
mod split_merge;
mod stdin;

pub use command::Command;
pub use config::IndexConfig;
pub use consts::{
    DEFAULT_BUCKET_CAPACITY, DEFAULT_PAGE_SIZE, MAX_HASH_DEPTH, MAX_LEVEL_DEPTH, MAX_LEVEL_SIZE,
    MERGE_THRESHOLD,
};
pub use error::{IndexError, Result};
pub use execute::execute_command;
pub use hash::{KeyHasher, XxHasher};
pub use hash_index::{HashIndex, IndexStats};
pub use key::{EncodeKey, Key, RecordId};
pub use page_store::{FilePageStore, MemoryPageStore, PageStore};
pub use rebuild::{
    Document, Documents, IndexedValue, MemorySource, ProgressListener, RecordSource, SourceError,
};
pub use repl::run_repl;
pub use setup::{setup_index, DEFAULT_INDEX_DIR, DEFAULT_INDEX_NAME};
pub use stdin::process_from_stdin;
