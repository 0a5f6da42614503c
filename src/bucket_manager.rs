//! Bucket pages on top of a [`PageStore`].
//!
//! Bucket `n` lives at byte offset `n * page_size` of the store. The manager
//! remembers the serialized length of every live page so a read only touches
//! the bytes actually used, and keeps freed pages on a singly linked list
//! threaded through the tombstoned pages themselves.

use tracing::debug;

use crate::bucket::{Bucket, BucketPage};
use crate::bytes::{ByteLength, ByteReader, FromBytes, IntoBytes};
use crate::consts::*;
use crate::error::{IndexError, Result};
use crate::page_store::PageStore;

pub struct BucketManager<S> {
    store: S,
    page_size: usize,
    /// Serialized length per page, `None` for tombstoned pages.
    sizes: Vec<Option<u32>>,
    free_head: Option<u64>,
}

impl<S: PageStore> BucketManager<S> {
    pub fn new(store: S, page_size: usize) -> Self {
        Self {
            store,
            page_size,
            sizes: Vec::new(),
            free_head: None,
        }
    }

    /// Rebuild the manager from a persisted size table and free list head.
    pub fn restore(
        store: S,
        page_size: usize,
        sizes: Vec<Option<u32>>,
        free_head: Option<u64>,
    ) -> Result<Self> {
        let pages = store.len() / page_size as u64;
        if (sizes.len() as u64) > pages {
            return Err(IndexError::Corrupted(format!(
                "size table lists {} buckets but the store holds {} pages",
                sizes.len(),
                pages
            )));
        }
        if let Some(head) = free_head {
            if !matches!(sizes.get(head as usize), Some(None)) {
                return Err(IndexError::Corrupted(format!(
                    "free bucket list starts at live or unknown page {}",
                    head
                )));
            }
        }
        Ok(Self {
            store,
            page_size,
            sizes,
            free_head,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn free_head(&self) -> Option<u64> {
        self.free_head
    }

    pub fn page_count(&self) -> usize {
        self.sizes.len()
    }

    pub fn free_count(&self) -> usize {
        self.sizes.iter().filter(|size| size.is_none()).count()
    }

    pub fn is_live(&self, id: u64) -> bool {
        matches!(self.sizes.get(id as usize), Some(Some(_)))
    }

    fn offset(&self, id: u64) -> u64 {
        id * self.page_size as u64
    }

    /// Lay out `count` empty buckets of the given depth in fresh pages.
    pub async fn init(&mut self, count: usize, depth: u8) -> Result<Vec<u64>> {
        let first = self.store.allocate(count * self.page_size).await?;
        if first % self.page_size as u64 != 0 {
            return Err(IndexError::Corrupted(format!(
                "bucket store grew from unaligned offset {}",
                first
            )));
        }
        let first_id = first / self.page_size as u64;
        self.sizes.resize(first_id as usize + count, None);

        let empty = Bucket::new(depth);
        let mut ids = Vec::with_capacity(count);
        for id in first_id..first_id + count as u64 {
            self.write(id, &empty).await?;
            ids.push(id);
        }
        Ok(ids)
    }

    pub async fn read(&self, id: u64) -> Result<Bucket> {
        let size = match self.sizes.get(id as usize) {
            Some(Some(size)) => *size as usize,
            Some(None) => {
                return Err(IndexError::Corrupted(format!(
                    "directory points at tombstoned bucket {}",
                    id
                )))
            }
            None => {
                return Err(IndexError::Corrupted(format!(
                    "directory points at unknown bucket {}",
                    id
                )))
            }
        };
        let bytes = self.store.read(self.offset(id), size).await?;
        match BucketPage::from_bytes(&mut ByteReader::new(&bytes, "bucket page"))? {
            BucketPage::Live(bucket) => Ok(bucket),
            BucketPage::Tombstone { .. } => Err(IndexError::Corrupted(format!(
                "bucket {} is live in the size table but tombstoned on disk",
                id
            ))),
        }
    }

    pub async fn write(&mut self, id: u64, bucket: &Bucket) -> Result<()> {
        if id as usize >= self.sizes.len() {
            return Err(IndexError::Corrupted(format!(
                "write to unknown bucket {}",
                id
            )));
        }
        let bytes = bucket.to_bytes();
        if bytes.len() > self.page_size {
            return Err(IndexError::Corrupted(format!(
                "bucket of {} bytes does not fit a {} byte page",
                bytes.len(),
                self.page_size
            )));
        }
        self.store.write(self.offset(id), &bytes).await?;
        self.sizes[id as usize] = Some(bytes.len() as u32);
        Ok(())
    }

    /// Store `bucket` in a page taken from the free list, or in a new page
    /// when the list is empty. Returns the page index.
    pub async fn acquire(&mut self, bucket: &Bucket) -> Result<u64> {
        let id = match self.free_head {
            Some(id) => {
                let bytes = self.store.read(self.offset(id), BUCKET_HEADER).await?;
                match BucketPage::from_bytes(&mut ByteReader::new(&bytes, "tombstone page"))? {
                    BucketPage::Tombstone { next_free } => {
                        self.free_head = next_free;
                        id
                    }
                    BucketPage::Live(_) => {
                        return Err(IndexError::Corrupted(format!(
                            "free bucket list points at live bucket {}",
                            id
                        )))
                    }
                }
            }
            None => {
                let offset = self.store.allocate(self.page_size).await?;
                let id = offset / self.page_size as u64;
                self.sizes.resize(id as usize + 1, None);
                id
            }
        };
        self.write(id, bucket).await?;
        Ok(id)
    }

    /// Tombstone a page and push it on the free list.
    pub async fn release(&mut self, id: u64) -> Result<()> {
        if !self.is_live(id) {
            return Err(IndexError::Corrupted(format!(
                "release of bucket {} which is not live",
                id
            )));
        }
        let bytes = BucketPage::tombstone_bytes(self.free_head);
        self.store.write(self.offset(id), &bytes).await?;
        self.sizes[id as usize] = None;
        self.free_head = Some(id);
        Ok(())
    }

    /// Persist both halves of a split: the new bucket first, then the bucket
    /// being split is rewritten in place. Returns the new bucket's page.
    pub async fn store_split(
        &mut self,
        updated_id: u64,
        updated: &Bucket,
        new_bucket: &Bucket,
    ) -> Result<u64> {
        let new_id = self.acquire(new_bucket).await?;
        self.write(updated_id, updated).await?;
        debug!(
            updated = updated_id,
            new = new_id,
            depth = updated.depth,
            kept = updated.len(),
            moved = new_bucket.len(),
            "bucket split"
        );
        Ok(new_id)
    }

    /// Forget every page.
    pub async fn clear(&mut self) -> Result<()> {
        self.store.truncate().await?;
        self.sizes.clear();
        self.free_head = None;
        Ok(())
    }

    /// Encoded size table: bucket count followed by one length per page.
    pub fn write_size_table(&self, out: &mut Vec<u8>) {
        out.extend((self.sizes.len() as u64).to_le_bytes());
        for size in &self.sizes {
            out.extend(size.map_or(-1, |size| size as i32).to_le_bytes());
        }
    }

    pub fn read_size_table(reader: &mut ByteReader<'_>) -> Result<Vec<Option<u32>>> {
        let count = reader.u64()? as usize;
        if count > reader.remaining() / 4 {
            return Err(IndexError::Corrupted(format!(
                "size table claims {} buckets",
                count
            )));
        }
        let mut sizes = Vec::with_capacity(count);
        for _ in 0..count {
            let size = reader.i32()?;
            sizes.push(match size {
                -1 => None,
                size if size >= BUCKET_HEADER as i32 => Some(size as u32),
                size => {
                    return Err(IndexError::Corrupted(format!(
                        "bucket size {} in size table",
                        size
                    )))
                }
            });
        }
        Ok(sizes)
    }
}

impl<S: PageStore> ByteLength for BucketManager<S> {
    fn byte_len(&self) -> usize {
        8 + self.sizes.len() * 4
    }
}
