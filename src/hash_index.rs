//! The public index: a directory of bucket pages behind one reader/writer lock.
//!
//! ## Files
//! - The bucket store holds one bucket per page. Its header keeps the entry
//!   count, the node table length, both free list heads, the identity of the
//!   index and the page geometry.
//! - The tree state store holds the identity again, the directory nodes and
//!   the bucket size table. It is rewritten as a whole on every flush.

use std::collections::HashMap;
use std::path::Path;

use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bucket::Bucket;
use crate::bucket_manager::BucketManager;
use crate::bytes::{ByteLength, ByteReader};
use crate::config::IndexConfig;
use crate::consts::*;
use crate::directory::Directory;
use crate::error::{IndexError, Result};
use crate::hash::{KeyHasher, XxHasher};
use crate::key::{EncodeKey, Key, RecordId};
use crate::page_store::{FilePageStore, MemoryPageStore, PageStore};
use crate::pointer::Pointer;
use crate::rebuild::{ProgressListener, RecordSource, SourceError};
use crate::split_merge::{Inserted, SplitMerge};

const IDENTITY_LEN: usize = 16;

/// Counters describing the shape of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub size: u64,
    /// Length of the node table, free entries included.
    pub node_table_len: usize,
    pub live_nodes: usize,
    pub free_nodes: usize,
    /// Pages in the bucket store, tombstones included.
    pub bucket_pages: usize,
    pub free_buckets: usize,
    /// Number of hash bits used by the deepest directory slot.
    pub max_global_depth: u8,
}

struct IndexState<S> {
    directory: Directory,
    buckets: BucketManager<S>,
    tree_store: S,
    size: u64,
}

impl<S: PageStore> IndexState<S> {
    fn engine<'a, H: KeyHasher>(
        &'a mut self,
        hasher: &'a H,
        capacity: usize,
    ) -> SplitMerge<'a, S, H> {
        SplitMerge {
            directory: &mut self.directory,
            buckets: &mut self.buckets,
            hasher,
            capacity,
        }
    }

    /// Drop every bucket and start over from 256 empty buckets under the root.
    async fn reset(&mut self) -> Result<()> {
        self.buckets.clear().await?;
        let ids = self.buckets.init(MAX_LEVEL_SIZE, MAX_LEVEL_DEPTH).await?;
        self.directory = Directory::new(&ids)?;
        self.size = 0;
        Ok(())
    }

    async fn bucket_for(&self, hash: u64) -> Result<Option<Bucket>> {
        let path = self.directory.locate(hash)?;
        match self.directory.pointer(path.last())? {
            Pointer::Bucket(id) => Ok(Some(self.buckets.read(id).await?)),
            Pointer::Empty => Ok(None),
            Pointer::Node { index, .. } => Err(IndexError::Corrupted(format!(
                "lookup stopped at a reference to node {}",
                index
            ))),
        }
    }

    /// Write the tree state and the header scalars, then sync both stores.
    async fn persist(&mut self, identity: Uuid, config: &IndexConfig) -> Result<()> {
        let page_size = config.page_size;
        let mut blob = Vec::with_capacity(
            IDENTITY_LEN + 8 + self.directory.nodes().len() * NODE_RECORD_SIZE
                + self.buckets.byte_len(),
        );
        blob.extend_from_slice(identity.as_bytes());
        self.directory.write_bytes(page_size, &mut blob);
        self.buckets.write_size_table(&mut blob);

        self.tree_store.truncate().await?;
        let offset = self.tree_store.allocate(blob.len()).await?;
        self.tree_store.write(offset, &blob).await?;
        self.tree_store.sync().await?;

        let identity = identity.as_u128();
        let nodes = self.directory.nodes();
        let header = [
            (HEADER_SIZE_SLOT, self.size as i64),
            (HEADER_TREE_SIZE_SLOT, nodes.len() as i64),
            (
                HEADER_TREE_TOMBSTONE_SLOT,
                nodes.free_head().map_or(-1, i64::from),
            ),
            (
                HEADER_BUCKET_TOMBSTONE_SLOT,
                self.buckets.free_head().map_or(-1, |head| head as i64),
            ),
            (HEADER_IDENTITY_HIGH_SLOT, (identity >> 64) as u64 as i64),
            (HEADER_IDENTITY_LOW_SLOT, identity as u64 as i64),
            (HEADER_PAGE_SIZE_SLOT, page_size as i64),
            (HEADER_CAPACITY_SLOT, config.bucket_capacity as i64),
        ];
        let store = self.buckets.store_mut();
        for (slot, value) in header {
            store.write_header(slot, value).await?;
        }
        store.sync().await
    }
}

/// Reads a `-1 or index` header scalar.
fn free_head(raw: i64, what: &str) -> Result<Option<u64>> {
    match raw {
        -1 => Ok(None),
        head if head >= 0 => Ok(Some(head as u64)),
        head => Err(IndexError::Corrupted(format!(
            "{} free list head is {}",
            what, head
        ))),
    }
}

/// Extendible hashing index from encoded keys to [`RecordId`]s.
///
/// Lookups share the lock, everything that changes the index takes it
/// exclusively. Splits and merges run to completion inside the call that
/// triggers them.
pub struct HashIndex<S: PageStore, H: KeyHasher = XxHasher> {
    config: IndexConfig,
    identity: Uuid,
    hasher: H,
    state: RwLock<IndexState<S>>,
}

impl<S: PageStore> HashIndex<S, XxHasher> {
    pub async fn create(config: IndexConfig, bucket_store: S, tree_store: S) -> Result<Self> {
        Self::create_with_hasher(config, bucket_store, tree_store, XxHasher).await
    }

    pub async fn open(config: IndexConfig, bucket_store: S, tree_store: S) -> Result<Self> {
        Self::open_with_hasher(config, bucket_store, tree_store, XxHasher).await
    }
}

impl HashIndex<FilePageStore, XxHasher> {
    /// Create `<dir>/<name>.obf` and `<dir>/<name>.tsc`, replacing any
    /// existing files of that name.
    pub async fn create_in_dir(config: IndexConfig, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let buckets = FilePageStore::new(config.bucket_file(dir));
        let tree = FilePageStore::new(config.tree_state_file(dir));
        Self::create(config, buckets, tree).await
    }

    pub async fn open_in_dir(config: IndexConfig, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let buckets = FilePageStore::new(config.bucket_file(dir));
        let tree = FilePageStore::new(config.tree_state_file(dir));
        Self::open(config, buckets, tree).await
    }
}

impl HashIndex<MemoryPageStore, XxHasher> {
    pub async fn in_memory(config: IndexConfig) -> Result<Self> {
        Self::in_memory_with_hasher(config, XxHasher).await
    }
}

impl<H: KeyHasher> HashIndex<MemoryPageStore, H> {
    pub async fn in_memory_with_hasher(config: IndexConfig, hasher: H) -> Result<Self> {
        Self::create_with_hasher(
            config,
            MemoryPageStore::new(),
            MemoryPageStore::new(),
            hasher,
        )
        .await
    }
}

impl<S: PageStore, H: KeyHasher> HashIndex<S, H> {
    /// Initialise both stores with an empty index of 256 buckets.
    pub async fn create_with_hasher(
        config: IndexConfig,
        mut bucket_store: S,
        mut tree_store: S,
        hasher: H,
    ) -> Result<Self> {
        config.validate()?;
        bucket_store.create().await?;
        tree_store.create().await?;

        let identity = Uuid::new_v4();
        let mut state = IndexState {
            directory: Directory::default(),
            buckets: BucketManager::new(bucket_store, config.page_size),
            tree_store,
            size: 0,
        };
        state.reset().await?;
        state.persist(identity, &config).await?;

        info!(
            index = %config.name,
            %identity,
            page_size = config.page_size,
            bucket_capacity = config.bucket_capacity,
            "hash index created"
        );
        Ok(Self {
            config,
            identity,
            hasher,
            state: RwLock::new(state),
        })
    }

    /// Load an index previously written by [`HashIndex::flush`].
    ///
    /// Page size and bucket capacity are taken from the stored header, the
    /// values in `config` only matter for new indexes.
    pub async fn open_with_hasher(
        mut config: IndexConfig,
        mut bucket_store: S,
        mut tree_store: S,
        hasher: H,
    ) -> Result<Self> {
        bucket_store.open().await?;
        tree_store.open().await?;

        let page_size = bucket_store.read_header(HEADER_PAGE_SIZE_SLOT);
        let capacity = bucket_store.read_header(HEADER_CAPACITY_SLOT);
        if page_size <= 0 || capacity <= 0 {
            return Err(IndexError::Corrupted(
                "bucket store header does not describe an index".into(),
            ));
        }
        if config.page_size as i64 != page_size || config.bucket_capacity as i64 != capacity {
            warn!(
                index = %config.name,
                page_size,
                bucket_capacity = capacity,
                "stored page geometry differs from configuration, using stored values"
            );
            config.page_size = page_size as usize;
            config.bucket_capacity = capacity as usize;
        }
        config.validate()?;

        let high = bucket_store.read_header(HEADER_IDENTITY_HIGH_SLOT) as u64 as u128;
        let low = bucket_store.read_header(HEADER_IDENTITY_LOW_SLOT) as u64 as u128;
        let identity = Uuid::from_u128((high << 64) | low);

        let blob = tree_store.read(0, tree_store.len() as usize).await?;
        let mut reader = ByteReader::new(&blob, "tree state");
        let mut stored = [0; IDENTITY_LEN];
        stored.copy_from_slice(reader.take(IDENTITY_LEN)?);
        let stored = Uuid::from_bytes(stored);
        if stored != identity {
            return Err(IndexError::IdentityMismatch {
                expected: identity,
                found: stored,
            });
        }

        let node_free_head = free_head(
            bucket_store.read_header(HEADER_TREE_TOMBSTONE_SLOT),
            "node",
        )?
        .map(u32::try_from)
        .transpose()
        .map_err(|_| IndexError::Corrupted("node free list head is out of range".into()))?;
        let directory = Directory::read_bytes(&mut reader, config.page_size, node_free_head)?;
        let tree_size = bucket_store.read_header(HEADER_TREE_SIZE_SLOT);
        if directory.nodes().len() as i64 != tree_size {
            return Err(IndexError::Corrupted(format!(
                "header records {} directory nodes, tree state holds {}",
                tree_size,
                directory.nodes().len()
            )));
        }

        let sizes = BucketManager::<S>::read_size_table(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(IndexError::Corrupted(format!(
                "{} unexpected bytes after tree state",
                reader.remaining()
            )));
        }
        let bucket_free_head = free_head(
            bucket_store.read_header(HEADER_BUCKET_TOMBSTONE_SLOT),
            "bucket",
        )?;
        let buckets =
            BucketManager::restore(bucket_store, config.page_size, sizes, bucket_free_head)?;

        let size = bucket_store_size(buckets.store())?;
        info!(index = %config.name, %identity, size, "hash index opened");
        Ok(Self {
            config,
            identity,
            hasher,
            state: RwLock::new(IndexState {
                directory,
                buckets,
                tree_store,
                size,
            }),
        })
    }

    fn encode<K: EncodeKey + ?Sized>(&self, key: &K) -> (Vec<u8>, u64) {
        let bytes = key.encoded_key();
        let hash = self.hasher.hash(&bytes);
        (bytes, hash)
    }

    pub async fn get<K: EncodeKey + ?Sized>(&self, key: &K) -> Result<Option<RecordId>> {
        let (bytes, hash) = self.encode(key);
        let state = self.state.read().await;
        Ok(state
            .bucket_for(hash)
            .await?
            .and_then(|bucket| bucket.get(&bytes)))
    }

    pub async fn contains<K: EncodeKey + ?Sized>(&self, key: &K) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Number of records stored under `key`, at most one.
    pub async fn count<K: EncodeKey + ?Sized>(&self, key: &K) -> Result<u64> {
        Ok(self.get(key).await?.map_or(0, |_| 1))
    }

    /// Store `key -> rid`, replacing any previous record for the key.
    ///
    /// A key too large to ever fit a bucket is skipped with a warning.
    pub async fn put<K: EncodeKey + ?Sized>(&self, key: &K, rid: RecordId) -> Result<()> {
        let (bytes, hash) = self.encode(key);
        let mut state = self.state.write().await;
        self.insert(&mut state, &bytes, hash, rid).await
    }

    async fn insert(
        &self,
        state: &mut IndexState<S>,
        key: &[u8],
        hash: u64,
        rid: RecordId,
    ) -> Result<()> {
        let max = self.config.max_key_size();
        if key.len() > max {
            let err = IndexError::KeyTooLarge {
                len: key.len(),
                max,
            };
            warn!(index = %self.config.name, %rid, "{}, skipping", err);
            return Ok(());
        }
        let inserted = state
            .engine(&self.hasher, self.config.bucket_capacity)
            .insert(key, hash, rid)
            .await?;
        if inserted == Inserted::Added {
            state.size += 1;
        }
        Ok(())
    }

    /// Returns whether the key was present.
    pub async fn remove<K: EncodeKey + ?Sized>(&self, key: &K) -> Result<bool> {
        let (bytes, hash) = self.encode(key);
        let mut state = self.state.write().await;
        let removed = state
            .engine(&self.hasher, self.config.bucket_capacity)
            .remove(&bytes, hash)
            .await?;
        if removed {
            state.size = state.size.saturating_sub(1);
        }
        Ok(removed)
    }

    /// Same as [`HashIndex::remove`]. A key maps to one record, so the record
    /// is not consulted.
    pub async fn remove_entry<K: EncodeKey + ?Sized>(
        &self,
        key: &K,
        _rid: RecordId,
    ) -> Result<bool> {
        self.remove(key).await
    }

    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.reset().await?;
        state.persist(self.identity, &self.config).await?;
        info!(index = %self.config.name, "hash index cleared");
        Ok(())
    }

    /// Empty the index and insert every record of the configured clusters.
    /// Returns the number of records that contributed at least one key.
    ///
    /// On failure the index is cleared again before the error is returned.
    pub async fn rebuild<R, L>(&self, source: &R, listener: &mut L) -> Result<u64>
    where
        R: RecordSource + ?Sized,
        L: ProgressListener + ?Sized,
    {
        let mut state = self.state.write().await;
        if let Err(err) = state.reset().await {
            warn!(index = %self.config.name, error = %err, "clear before rebuild failed");
        }

        match self.populate(&mut state, source, listener).await {
            Ok(indexed) => {
                listener.on_completion(true);
                info!(
                    index = %self.config.name,
                    indexed,
                    size = state.size,
                    "hash index rebuilt"
                );
                Ok(indexed)
            }
            Err(err) => {
                listener.on_completion(false);
                let cleared = match state.reset().await {
                    Ok(()) => state.persist(self.identity, &self.config).await,
                    Err(err) => Err(err),
                };
                if let Err(clear_err) = cleared {
                    warn!(
                        index = %self.config.name,
                        error = %clear_err,
                        "clear after failed rebuild failed"
                    );
                }
                Err(IndexError::Rebuild {
                    clusters: self.config.clusters.clone(),
                    source: Box::new(err),
                })
            }
        }
    }

    async fn populate<R, L>(
        &self,
        state: &mut IndexState<S>,
        source: &R,
        listener: &mut L,
    ) -> Result<u64>
    where
        R: RecordSource + ?Sized,
        L: ProgressListener + ?Sized,
    {
        let source_error = |err: SourceError| IndexError::Source(err.to_string());

        let mut total = 0;
        for cluster in &self.config.clusters {
            total += source.count(cluster).map_err(source_error)?;
        }
        listener.on_begin(total);

        let mut done = 0;
        let mut indexed = 0;
        for cluster in &self.config.clusters {
            let documents = source.browse(cluster).map_err(source_error)?;
            for document in documents {
                let document = match document {
                    Ok(document) => document,
                    Err(SourceError::EndOfCollection) => break,
                    Err(err) => return Err(source_error(err)),
                };
                if let Some(value) = &document.value {
                    for key in value.keys() {
                        let (bytes, hash) = self.encode(key);
                        self.insert(state, &bytes, hash, document.rid).await?;
                    }
                    indexed += 1;
                }
                done += 1;
                listener.on_progress(done, total);
            }
        }

        state.persist(self.identity, &self.config).await?;
        Ok(indexed)
    }

    /// Persist the entry count and the directory.
    pub async fn flush(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.persist(self.identity, &self.config).await
    }

    /// Flush and close both stores, handing them back.
    pub async fn close(self) -> Result<(S, S)> {
        let mut state = self.state.into_inner();
        state.persist(self.identity, &self.config).await?;
        let mut bucket_store = state.buckets.into_store();
        let mut tree_store = state.tree_store;
        bucket_store.close().await?;
        tree_store.close().await?;
        info!(index = %self.config.name, "hash index closed");
        Ok((bucket_store, tree_store))
    }

    /// Remove both stores without flushing.
    pub async fn delete(self) -> Result<()> {
        let state = self.state.into_inner();
        let mut bucket_store = state.buckets.into_store();
        let mut tree_store = state.tree_store;
        bucket_store.delete().await?;
        tree_store.delete().await?;
        info!(index = %self.config.name, "hash index deleted");
        Ok(())
    }

    pub async fn size(&self) -> u64 {
        self.state.read().await.size
    }

    pub fn identity(&self) -> Uuid {
        self.identity
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let state = self.state.read().await;
        let nodes = state.directory.nodes();
        Ok(IndexStats {
            size: state.size,
            node_table_len: nodes.len(),
            live_nodes: nodes.live_count(),
            free_nodes: nodes.free_count(),
            bucket_pages: state.buckets.page_count(),
            free_buckets: state.buckets.free_count(),
            max_global_depth: state.directory.max_global_depth()?,
        })
    }

    /// Check the directory against the bucket pages.
    ///
    /// Every slot must lead to a live bucket whose prefix it extends, every
    /// live bucket must own exactly its share of the hash space, every entry
    /// must sit in the bucket its hash routes to, and the entry count must
    /// match the stored size.
    pub async fn verify(&self) -> Result<()> {
        let state = self.state.read().await;

        // bucket -> (prefix at slot depth, slot depth) for every slot naming it
        let mut slots: HashMap<u64, Vec<(u64, u8)>> = HashMap::new();
        for visit in state.directory.walk()? {
            match visit.pointer {
                Pointer::Bucket(id) => {
                    slots.entry(id).or_default().push((visit.prefix, visit.depth))
                }
                pointer => {
                    return Err(IndexError::Corrupted(format!(
                        "slot {:#x} at depth {} holds {}",
                        visit.prefix, visit.depth, pointer
                    )))
                }
            }
        }

        let live = state.buckets.page_count() - state.buckets.free_count();
        if slots.len() != live {
            return Err(IndexError::Corrupted(format!(
                "directory reaches {} buckets, {} pages are live",
                slots.len(),
                live
            )));
        }

        let mut entries = 0u64;
        for (id, visits) in &slots {
            let bucket = state.buckets.read(*id).await?;
            let mut expected = None;
            let mut covered = 0u128;
            for &(slot_prefix, slot_depth) in visits {
                if bucket.depth == 0 || bucket.depth > slot_depth {
                    return Err(IndexError::Corrupted(format!(
                        "bucket {} of depth {} is reached by a slot of depth {}",
                        id, bucket.depth, slot_depth
                    )));
                }
                let bucket_prefix = slot_prefix >> (slot_depth - bucket.depth);
                if *expected.get_or_insert(bucket_prefix) != bucket_prefix {
                    return Err(IndexError::Corrupted(format!(
                        "bucket {} is reached by slots of different prefixes",
                        id
                    )));
                }
                covered += 1u128 << (MAX_HASH_DEPTH - slot_depth);
            }
            if covered != 1u128 << (MAX_HASH_DEPTH - bucket.depth) {
                return Err(IndexError::Corrupted(format!(
                    "bucket {} of depth {} covers {:#x} hashes",
                    id, bucket.depth, covered
                )));
            }
            if let Some(expected) = expected {
                if !bucket.shares_prefix(&self.hasher, expected) {
                    return Err(IndexError::Corrupted(format!(
                        "bucket {} holds a key outside prefix {:#x}",
                        id, expected
                    )));
                }
            }
            entries += bucket.len() as u64;
        }

        if entries != state.size {
            return Err(IndexError::Corrupted(format!(
                "buckets hold {} entries, size is {}",
                entries, state.size
            )));
        }
        Ok(())
    }

    /// Hash routing has no key order.
    pub fn supports_ordered_iteration(&self) -> bool {
        false
    }

    pub fn keys(&self) -> Result<Vec<Key>> {
        Err(IndexError::Unsupported("keys"))
    }

    pub fn values_between(&self, _from: &Key, _to: &Key) -> Result<Vec<RecordId>> {
        Err(IndexError::Unsupported("values_between"))
    }

    pub fn values_major(&self, _from: &Key, _inclusive: bool) -> Result<Vec<RecordId>> {
        Err(IndexError::Unsupported("values_major"))
    }

    pub fn values_minor(&self, _to: &Key, _inclusive: bool) -> Result<Vec<RecordId>> {
        Err(IndexError::Unsupported("values_minor"))
    }

    pub fn entries_between(&self, _from: &Key, _to: &Key) -> Result<Vec<(Key, RecordId)>> {
        Err(IndexError::Unsupported("entries_between"))
    }

    pub fn remove_record(&self, _rid: RecordId) -> Result<u64> {
        Err(IndexError::Unsupported("remove_record"))
    }
}

fn bucket_store_size<S: PageStore>(store: &S) -> Result<u64> {
    match store.read_header(HEADER_SIZE_SLOT) {
        size if size >= 0 => Ok(size as u64),
        size => Err(IndexError::Corrupted(format!("stored size is {}", size))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rebuild::{Document, Documents, IndexedValue, MemorySource};

    async fn index() -> HashIndex<MemoryPageStore> {
        HashIndex::in_memory(IndexConfig::new("people").cluster("person"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let index = index().await;
        index.put("ada", RecordId::new(1, 1)).await.unwrap();
        index.put(&7i64, RecordId::new(1, 2)).await.unwrap();
        assert_eq!(index.get("ada").await.unwrap(), Some(RecordId::new(1, 1)));
        assert_eq!(index.count(&7i64).await.unwrap(), 1);
        assert_eq!(index.size().await, 2);

        index.put("ada", RecordId::new(1, 3)).await.unwrap();
        assert_eq!(index.get("ada").await.unwrap(), Some(RecordId::new(1, 3)));
        assert_eq!(index.size().await, 2);

        assert!(index.remove("ada").await.unwrap());
        assert!(!index.contains("ada").await.unwrap());
        assert_eq!(index.size().await, 1);
        index.verify().await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_key_is_skipped() {
        let index = index().await;
        let key = "k".repeat(200);
        index.put(key.as_str(), RecordId::new(1, 1)).await.unwrap();
        assert_eq!(index.size().await, 0);
        assert!(!index.contains(key.as_str()).await.unwrap());
    }

    #[tokio::test]
    async fn test_reopen_memory_stores() {
        let index = index().await;
        for i in 0..500i64 {
            index.put(&i, RecordId::new(2, i)).await.unwrap();
        }
        let identity = index.identity();
        let (buckets, tree) = index.close().await.unwrap();

        let index = HashIndex::open(IndexConfig::new("people"), buckets, tree)
            .await
            .unwrap();
        assert_eq!(index.identity(), identity);
        assert_eq!(index.size().await, 500);
        assert_eq!(index.get(&321i64).await.unwrap(), Some(RecordId::new(2, 321)));
        index.verify().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_rejects_foreign_tree_state() {
        let (buckets, _) = index().await.close().await.unwrap();
        let (_, tree) = index().await.close().await.unwrap();
        assert!(matches!(
            HashIndex::open(IndexConfig::new("people"), buckets, tree).await,
            Err(IndexError::IdentityMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_clear_resets_shape() {
        let index = index().await;
        for i in 0..2000i64 {
            index.put(&i, RecordId::new(2, i)).await.unwrap();
        }
        index.clear().await.unwrap();
        let stats = index.stats().await.unwrap();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.live_nodes, 1);
        assert_eq!(stats.bucket_pages, MAX_LEVEL_SIZE);
        assert_eq!(stats.max_global_depth, MAX_LEVEL_DEPTH);
        assert!(!index.contains(&5i64).await.unwrap());
    }

    #[derive(Default)]
    struct Progress {
        total: u64,
        done: u64,
        outcome: Option<bool>,
    }

    impl ProgressListener for Progress {
        fn on_begin(&mut self, total: u64) {
            self.total = total;
        }

        fn on_progress(&mut self, done: u64, _total: u64) {
            self.done = done;
        }

        fn on_completion(&mut self, succeeded: bool) {
            self.outcome = Some(succeeded);
        }
    }

    #[tokio::test]
    async fn test_rebuild_from_source() {
        let index = index().await;
        index.put("stale", RecordId::new(0, 0)).await.unwrap();
        let source = MemorySource::new().cluster(
            "person",
            vec![
                Document {
                    rid: RecordId::new(5, 0),
                    value: Some(IndexedValue::Single(Key::from("ada"))),
                },
                Document {
                    rid: RecordId::new(5, 1),
                    value: None,
                },
                Document {
                    rid: RecordId::new(5, 2),
                    value: Some(IndexedValue::Many(vec![Key::Int(1), Key::Int(2)])),
                },
            ],
        );
        let mut progress = Progress::default();
        assert_eq!(index.rebuild(&source, &mut progress).await.unwrap(), 2);
        assert_eq!((progress.total, progress.done), (3, 3));
        assert_eq!(progress.outcome, Some(true));

        assert_eq!(index.size().await, 3);
        assert!(!index.contains("stale").await.unwrap());
        assert_eq!(index.get(&2i64).await.unwrap(), Some(RecordId::new(5, 2)));
    }

    /// Cluster "a" ends early after its first record, "b" is complete.
    struct TruncatedSource;

    fn int_document(position: i64) -> Document {
        Document {
            rid: RecordId::new(7, position),
            value: Some(IndexedValue::Single(Key::Int(position))),
        }
    }

    impl RecordSource for TruncatedSource {
        fn count(&self, cluster: &str) -> std::result::Result<u64, SourceError> {
            match cluster {
                "a" => Ok(2),
                "b" => Ok(1),
                other => Err(SourceError::UnknownCluster(other.to_string())),
            }
        }

        fn browse(&self, cluster: &str) -> std::result::Result<Documents<'_>, SourceError> {
            let documents = match cluster {
                "a" => vec![
                    Ok(int_document(0)),
                    Err(SourceError::EndOfCollection),
                    Ok(int_document(1)),
                ],
                "b" => vec![Ok(int_document(100))],
                other => return Err(SourceError::UnknownCluster(other.to_string())),
            };
            Ok(Box::new(documents.into_iter()))
        }
    }

    #[tokio::test]
    async fn test_rebuild_stops_cluster_at_end_of_collection() {
        let index = HashIndex::in_memory(IndexConfig::new("numbers").cluster("a").cluster("b"))
            .await
            .unwrap();
        let mut progress = Progress::default();
        assert_eq!(index.rebuild(&TruncatedSource, &mut progress).await.unwrap(), 2);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.outcome, Some(true));

        assert_eq!(index.size().await, 2);
        assert_eq!(index.get(&0i64).await.unwrap(), Some(RecordId::new(7, 0)));
        assert!(!index.contains(&1i64).await.unwrap());
        assert_eq!(index.get(&100i64).await.unwrap(), Some(RecordId::new(7, 100)));
        index.verify().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_rebuild_leaves_index_empty() {
        let index = index().await;
        index.put("stale", RecordId::new(0, 0)).await.unwrap();
        let mut progress = Progress::default();
        let err = index
            .rebuild(&MemorySource::new(), &mut progress)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Rebuild { .. }));
        assert_eq!(progress.outcome, Some(false));
        assert_eq!(index.size().await, 0);
        index.verify().await.unwrap();
    }

    #[tokio::test]
    async fn test_ordered_operations_are_unsupported() {
        let index = index().await;
        assert!(!index.supports_ordered_iteration());
        assert!(matches!(index.keys(), Err(IndexError::Unsupported("keys"))));
        assert!(index
            .values_between(&Key::Int(1), &Key::Int(2))
            .is_err());
        assert!(index.remove_record(RecordId::new(1, 1)).is_err());
    }
}
