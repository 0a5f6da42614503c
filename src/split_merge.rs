//! Insertion and removal on top of the directory and the bucket pages,
//! including the restructuring they trigger.

use std::collections::HashMap;

use tracing::debug;

use crate::bucket::{Bucket, Entry};
use crate::bucket_manager::BucketManager;
use crate::consts::*;
use crate::directory::{BucketPath, Directory, Touched};
use crate::error::{IndexError, Result};
use crate::hash::KeyHasher;
use crate::key::RecordId;
use crate::page_store::PageStore;
use crate::pointer::Pointer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    Added,
    Updated,
}

pub struct SplitMerge<'a, S, H: ?Sized> {
    pub directory: &'a mut Directory,
    pub buckets: &'a mut BucketManager<S>,
    pub hasher: &'a H,
    pub capacity: usize,
}

fn bucket_id(pointer: Pointer) -> Result<u64> {
    match pointer {
        Pointer::Bucket(id) => Ok(id),
        Pointer::Empty => Err(IndexError::Corrupted(
            "directory slot was never assigned a bucket".into(),
        )),
        Pointer::Node { index, .. } => Err(IndexError::Corrupted(format!(
            "lookup stopped at a reference to node {}",
            index
        ))),
    }
}

impl<'a, S: PageStore, H: KeyHasher + ?Sized> SplitMerge<'a, S, H> {
    /// Store `key -> rid`, splitting full buckets until the key fits.
    ///
    /// Every round either stores the entry or makes the target bucket one bit
    /// deeper, so the loop ends after at most 64 rounds.
    pub async fn insert(&mut self, key: &[u8], hash: u64, rid: RecordId) -> Result<Inserted> {
        for _ in 0..=MAX_HASH_DEPTH {
            let path = self.directory.locate(hash)?;
            let id = bucket_id(self.directory.pointer(path.last())?)?;
            let mut bucket = self.buckets.read(id).await?;

            if let Some(i) = bucket.find(key) {
                bucket.entries[i].rid = rid;
                self.buckets.write(id, &bucket).await?;
                return Ok(Inserted::Updated);
            }

            if bucket.len() < self.capacity {
                bucket.entries.push(Entry {
                    key: key.to_vec(),
                    rid,
                });
                self.buckets.write(id, &bucket).await?;
                return Ok(Inserted::Added);
            }

            if bucket.depth >= MAX_HASH_DEPTH {
                return Err(IndexError::DepthExhausted);
            }
            self.split(&path, id, bucket).await?;
        }
        Err(IndexError::DepthExhausted)
    }

    async fn split(&mut self, path: &BucketPath, id: u64, mut bucket: Bucket) -> Result<()> {
        let new_bucket = bucket.split(self.hasher);
        let new_depth = bucket.depth;
        let new_id = self.buckets.store_split(id, &bucket, &new_bucket).await?;

        let updated = Pointer::Bucket(id);
        let new = Pointer::Bucket(new_id);
        let level = path.last();
        if new_depth <= level.global_depth {
            self.directory
                .update_after_bucket_split(path, new_depth, updated, new)
        } else if level.local_depth < MAX_LEVEL_DEPTH {
            self.directory.split_node(path, updated, new)
        } else {
            self.directory.add_new_level(path, updated, new)
        }
    }

    /// Remove `key`, then merge underfull buckets and fold away directory
    /// nodes that no longer distinguish anything.
    pub async fn remove(&mut self, key: &[u8], hash: u64) -> Result<bool> {
        let path = self.directory.locate(hash)?;
        let id = bucket_id(self.directory.pointer(path.last())?)?;
        let mut bucket = self.buckets.read(id).await?;
        let Some(i) = bucket.find(key) else {
            return Ok(false);
        };
        bucket.entries.remove(i);

        let mut touched = Vec::new();
        let mut paths = vec![path];
        if self.merge(&paths[0], id, &bucket, &mut touched).await? {
            // the surviving bucket may now be mergeable with its own buddy
            loop {
                let path = self.directory.locate(hash)?;
                let id = bucket_id(self.directory.pointer(path.last())?)?;
                let bucket = self.buckets.read(id).await?;
                let merged = self.merge(&path, id, &bucket, &mut touched).await?;
                paths.push(path);
                if !merged {
                    break;
                }
            }
        } else {
            self.buckets.write(id, &bucket).await?;
        }

        self.collapse(&paths, &touched)?;
        Ok(true)
    }

    /// Fold `bucket` into its buddy when it is underfull and the buddy has the
    /// same depth and room for its entries.
    async fn merge(
        &mut self,
        path: &BucketPath,
        id: u64,
        bucket: &Bucket,
        touched: &mut Vec<Touched>,
    ) -> Result<bool> {
        let depth = bucket.depth;
        if bucket.len() as f64 > self.capacity as f64 * MERGE_THRESHOLD {
            return Ok(false);
        }
        if depth <= MAX_LEVEL_DEPTH {
            return Ok(false);
        }

        let range = self.directory.split_range(path, depth - 1)?;
        let level = path.levels[range.level];
        let in_upper = level.item_index >= range.start + range.half;
        let buddy_slot = if in_upper {
            range.start
        } else {
            range.start + range.half
        };
        let buddy_pointer = self
            .directory
            .resolve_first(level.node, level.hash_map_offset + buddy_slot)?;
        let buddy_id = bucket_id(buddy_pointer)?;
        if buddy_id == id {
            return Err(IndexError::Corrupted(format!(
                "bucket {} is its own buddy",
                id
            )));
        }

        let mut buddy = self.buckets.read(buddy_id).await?;
        if buddy.depth != depth || bucket.len() + buddy.len() >= self.capacity {
            return Ok(false);
        }

        buddy.entries.extend(bucket.entries.iter().cloned());
        buddy.depth = depth - 1;
        self.buckets.write(buddy_id, &buddy).await?;
        self.buckets.release(id).await?;
        self.directory.fill(
            level.node,
            level.hash_map_offset,
            range.start,
            range.end(),
            Pointer::Bucket(buddy_id),
            touched,
        )?;

        debug!(
            bucket = id,
            buddy = buddy_id,
            depth = depth - 1,
            entries = buddy.len(),
            "buckets merged"
        );
        Ok(true)
    }

    /// Collapse every node seen on a lookup path or rewritten by a merge,
    /// retrying a parent whenever one of its children goes away.
    fn collapse(&mut self, paths: &[BucketPath], touched: &[Touched]) -> Result<()> {
        let mut parent_of = HashMap::new();
        let mut pending = Vec::new();
        for path in paths {
            for pair in path.levels.windows(2) {
                parent_of.insert(pair[1].node, pair[0].node);
            }
        }
        for touch in touched {
            parent_of.insert(touch.child, touch.parent);
            pending.push(touch.child);
        }
        // deepest nodes are popped first
        for path in paths {
            pending.extend(path.levels.iter().skip(1).map(|level| level.node));
        }

        while let Some(node) = pending.pop() {
            let Some(&parent) = parent_of.get(&node) else {
                continue;
            };
            if self.directory.collapse(node, parent)? {
                parent_of.remove(&node);
                pending.push(parent);
            }
        }
        Ok(())
    }
}
