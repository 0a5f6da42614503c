use crate::bytes::{ByteLength, ByteReader, FromBytes, IntoBytes};
use crate::consts::*;
use crate::error::{IndexError, Result};
use crate::hash::{prefix, split_bit, KeyHasher};
use crate::key::RecordId;

const TOMBSTONE_FLAG: u8 = 1;

/// One key of the index and the record it points at.
///
/// ## Binary layout
/// - 2 bytes key length
/// - the encoded key
/// - 2 bytes cluster id followed by 8 bytes cluster position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub rid: RecordId,
}

impl ByteLength for Entry {
    fn byte_len(&self) -> usize {
        ENTRY_OVERHEAD + self.key.len()
    }
}

impl IntoBytes for Entry {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend((self.key.len() as u16).to_le_bytes());
        out.extend(&self.key);
        self.rid.write_bytes(out);
    }
}

impl FromBytes for Entry {
    fn from_bytes(reader: &mut ByteReader<'_>) -> Result<Self> {
        let key_len = reader.u16()? as usize;
        let key = reader.take(key_len)?.to_vec();
        let rid = RecordId::from_bytes(reader)?;
        Ok(Entry { key, rid })
    }
}

/// Rust representation of a bucket page
///
/// ## Binary layout
///
/// - 1 byte depth, the number of leading hash bits shared by every key
/// - 1 byte flags, bit 0 marks a tombstone
/// - 2 bytes entry count
/// - 8 bytes index of the next free page, -1 when there is none
/// - the entries
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bucket {
    pub depth: u8,
    pub entries: Vec<Entry>,
}

impl Bucket {
    pub fn new(depth: u8) -> Self {
        Self {
            depth,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn find(&self, key: &[u8]) -> Option<usize> {
        self.entries.iter().position(|entry| entry.key == key)
    }

    pub fn get(&self, key: &[u8]) -> Option<RecordId> {
        self.find(key).map(|i| self.entries[i].rid)
    }

    /// Moves every entry whose next hash bit is set into a new bucket and
    /// returns it. Both buckets end up one bit deeper.
    pub fn split<H: KeyHasher + ?Sized>(&mut self, hasher: &H) -> Bucket {
        let depth = self.depth + 1;
        let (moved, kept): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| split_bit(hasher.hash(&entry.key), depth));
        self.entries = kept;
        self.depth = depth;
        Bucket {
            depth,
            entries: moved,
        }
    }

    /// True when every key agrees with the `depth` leading bits of `expected`.
    pub fn shares_prefix<H: KeyHasher + ?Sized>(&self, hasher: &H, expected: u64) -> bool {
        if self.depth == 0 {
            return true;
        }
        self.entries
            .iter()
            .all(|entry| prefix(hasher.hash(&entry.key), self.depth) == expected)
    }
}

impl ByteLength for Bucket {
    fn byte_len(&self) -> usize {
        BUCKET_HEADER + self.entries.iter().map(|e| e.byte_len()).sum::<usize>()
    }
}

impl IntoBytes for Bucket {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.push(self.depth);
        out.push(0);
        out.extend((self.entries.len() as u16).to_le_bytes());
        out.extend((-1i64).to_le_bytes());
        for entry in &self.entries {
            entry.write_bytes(out);
        }
    }
}

/// What a bucket page holds: a live bucket or a link in the free page list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketPage {
    Live(Bucket),
    Tombstone { next_free: Option<u64> },
}

impl BucketPage {
    pub fn tombstone_bytes(next_free: Option<u64>) -> Vec<u8> {
        let mut out = Vec::with_capacity(BUCKET_HEADER);
        out.push(0);
        out.push(TOMBSTONE_FLAG);
        out.extend(0u16.to_le_bytes());
        out.extend(next_free.map_or(-1, |next| next as i64).to_le_bytes());
        out
    }
}

impl FromBytes for BucketPage {
    fn from_bytes(reader: &mut ByteReader<'_>) -> Result<Self> {
        let depth = reader.u8()?;
        let flags = reader.u8()?;
        let count = reader.u16()? as usize;
        let next = reader.i64()?;

        if flags & TOMBSTONE_FLAG != 0 {
            let next_free = match next {
                -1 => None,
                next if next >= 0 => Some(next as u64),
                next => {
                    return Err(IndexError::Corrupted(format!(
                        "tombstone links to page {}",
                        next
                    )))
                }
            };
            return Ok(BucketPage::Tombstone { next_free });
        }

        if depth > MAX_HASH_DEPTH {
            return Err(IndexError::Corrupted(format!("bucket depth {}", depth)));
        }
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(Entry::from_bytes(reader)?);
        }
        Ok(BucketPage::Live(Bucket { depth, entries }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Uses the first 8 key bytes as the hash.
    struct Prefixed;

    impl KeyHasher for Prefixed {
        fn hash(&self, bytes: &[u8]) -> u64 {
            let mut buf = [0; 8];
            buf.copy_from_slice(&bytes[..8]);
            u64::from_be_bytes(buf)
        }
    }

    fn entry(hash: u64, position: i64) -> Entry {
        Entry {
            key: hash.to_be_bytes().to_vec(),
            rid: RecordId::new(1, position),
        }
    }

    #[test]
    fn test_bucket_bytes() {
        let mut bucket = Bucket::new(9);
        bucket.entries.push(entry(7, 1));
        bucket.entries.push(entry(8, 2));

        let bytes = bucket.to_bytes();
        assert_eq!(bytes.len(), bucket.byte_len());
        assert_eq!(bytes.len(), BUCKET_HEADER + 2 * (ENTRY_OVERHEAD + 8));

        let page = BucketPage::from_bytes(&mut ByteReader::new(&bytes, "bucket")).unwrap();
        assert_eq!(page, BucketPage::Live(bucket));
    }

    #[test]
    fn test_tombstone_page() {
        let bytes = BucketPage::tombstone_bytes(Some(42));
        let page = BucketPage::from_bytes(&mut ByteReader::new(&bytes, "bucket")).unwrap();
        assert_eq!(page, BucketPage::Tombstone { next_free: Some(42) });

        let bytes = BucketPage::tombstone_bytes(None);
        let page = BucketPage::from_bytes(&mut ByteReader::new(&bytes, "bucket")).unwrap();
        assert_eq!(page, BucketPage::Tombstone { next_free: None });
    }

    #[test]
    fn test_split_partitions_on_next_bit() {
        let mut bucket = Bucket::new(1);
        // top bit 0 for all, second bit decides
        bucket.entries.push(entry(0b00 << 62, 1));
        bucket.entries.push(entry(0b01 << 62, 2));
        bucket.entries.push(entry((0b01 << 62) | 5, 3));

        let new_bucket = bucket.split(&Prefixed);
        assert_eq!(bucket.depth, 2);
        assert_eq!(new_bucket.depth, 2);
        assert_eq!(bucket.len(), 1);
        assert_eq!(new_bucket.len(), 2);
        assert!(bucket.shares_prefix(&Prefixed, 0b00));
        assert!(new_bucket.shares_prefix(&Prefixed, 0b01));
    }

    #[test]
    fn test_find_and_get() {
        let mut bucket = Bucket::new(8);
        bucket.entries.push(entry(3, 30));
        assert_eq!(bucket.get(&3u64.to_be_bytes()), Some(RecordId::new(1, 30)));
        assert_eq!(bucket.find(&4u64.to_be_bytes()), None);
    }

    #[test]
    fn test_truncated_page_is_corruption() {
        let mut bucket = Bucket::new(8);
        bucket.entries.push(entry(3, 30));
        let bytes = bucket.to_bytes();
        let err = BucketPage::from_bytes(&mut ByteReader::new(&bytes[..bytes.len() - 1], "bucket"))
            .unwrap_err();
        assert!(matches!(err, IndexError::Corrupted(_)));
    }
}
