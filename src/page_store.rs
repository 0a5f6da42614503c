//! Paged storage used for bucket pages and the serialized directory.
//!
//! A store is a header of [`HEADER_SLOTS`] little endian `i64` scalars followed
//! by a data region addressed by byte offset. Space in the data region is only
//! handed out through [`PageStore::allocate`].

use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::consts::{HEADER_SIZE, HEADER_SLOTS};
use crate::error::{IndexError, Result};

pub trait PageStore: Send + Sync + 'static {
    /// Start from an empty store, discarding anything already there.
    fn create(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Attach to previously created content.
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Length of the data region in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow the data region by `size` bytes and return the offset of the new space.
    fn allocate(&mut self, size: usize) -> impl Future<Output = Result<u64>> + Send;

    fn read(&self, offset: u64, len: usize) -> impl Future<Output = Result<Vec<u8>>> + Send;

    fn write(&mut self, offset: u64, bytes: &[u8]) -> impl Future<Output = Result<()>> + Send;

    fn read_header(&self, slot: usize) -> i64;

    fn write_header(&mut self, slot: usize, value: i64) -> impl Future<Output = Result<()>> + Send;

    /// Drop the whole data region. Header scalars are kept.
    fn truncate(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close the store and remove its content for good.
    fn delete(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn sync(&mut self) -> impl Future<Output = Result<()>> + Send;
}

fn check_slot(slot: usize) -> Result<()> {
    if slot >= HEADER_SLOTS {
        return Err(IndexError::Corrupted(format!(
            "header slot {} out of range",
            slot
        )));
    }
    Ok(())
}

fn out_of_bounds(offset: u64, len: usize, data_len: u64) -> IndexError {
    IndexError::Corrupted(format!(
        "page access at {}..{} is past the end of the store ({} bytes)",
        offset,
        offset + len as u64,
        data_len
    ))
}

/// Page store backed by a single file.
///
/// ## File layout
/// - [`HEADER_SIZE`] bytes of header scalars
/// - the data region, offset 0 of the data region is file position [`HEADER_SIZE`]
#[derive(Debug)]
pub struct FilePageStore {
    path: PathBuf,
    /// Reads go through `&self`, so the file handle sits behind a lock.
    file: Option<Mutex<File>>,
    header: [i64; HEADER_SLOTS],
    data_len: u64,
}

impl FilePageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            header: [0; HEADER_SLOTS],
            data_len: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        match self.file.as_mut() {
            Some(file) => Ok(file.get_mut()),
            None => Err(not_open(&self.path)),
        }
    }

    async fn write_at(&mut self, position: u64, bytes: &[u8]) -> Result<()> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(position))
            .await
            .map_err(IndexError::io("page seek"))?;
        file.write_all(bytes)
            .await
            .map_err(IndexError::io("page write"))
    }
}

fn not_open(path: &Path) -> IndexError {
    IndexError::Io {
        context: "page store access",
        source: std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            format!("{} is not open", path.display()),
        ),
    }
}

impl PageStore for FilePageStore {
    async fn create(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&self.path)
            .await
            .map_err(IndexError::io("page store create"))?;
        self.file = Some(Mutex::new(file));
        self.header = [0; HEADER_SLOTS];
        self.data_len = 0;
        self.write_at(0, &[0; HEADER_SIZE]).await
    }

    async fn open(&mut self) -> Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .await
            .map_err(IndexError::io("page store open"))?;
        let file_len = file
            .metadata()
            .await
            .map_err(IndexError::io("page store open"))?
            .len();
        if file_len < HEADER_SIZE as u64 {
            return Err(IndexError::Corrupted(format!(
                "{} is too short to hold a page store header",
                self.path.display()
            )));
        }

        let mut buf = [0; HEADER_SIZE];
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(IndexError::io("page store open"))?;
        file.read_exact(&mut buf)
            .await
            .map_err(IndexError::io("page store open"))?;
        for (slot, chunk) in buf.chunks_exact(8).enumerate() {
            let mut scalar = [0; 8];
            scalar.copy_from_slice(chunk);
            self.header[slot] = i64::from_le_bytes(scalar);
        }

        self.data_len = file_len - HEADER_SIZE as u64;
        self.file = Some(Mutex::new(file));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.file.is_some() {
            self.sync().await?;
        }
        self.file = None;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.data_len
    }

    async fn allocate(&mut self, size: usize) -> Result<u64> {
        let offset = self.data_len;
        let new_len = offset + size as u64;
        self.file_mut()?
            .set_len(HEADER_SIZE as u64 + new_len)
            .await
            .map_err(IndexError::io("page allocate"))?;
        self.data_len = new_len;
        Ok(offset)
    }

    async fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if offset + len as u64 > self.data_len {
            return Err(out_of_bounds(offset, len, self.data_len));
        }
        let mut file = match self.file.as_ref() {
            Some(file) => file.lock().await,
            None => return Err(not_open(&self.path)),
        };
        file.seek(SeekFrom::Start(HEADER_SIZE as u64 + offset))
            .await
            .map_err(IndexError::io("page seek"))?;
        let mut buf = vec![0; len];
        file.read_exact(&mut buf)
            .await
            .map_err(IndexError::io("page read"))?;
        Ok(buf)
    }

    async fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        if offset + bytes.len() as u64 > self.data_len {
            return Err(out_of_bounds(offset, bytes.len(), self.data_len));
        }
        self.write_at(HEADER_SIZE as u64 + offset, bytes).await
    }

    fn read_header(&self, slot: usize) -> i64 {
        self.header.get(slot).copied().unwrap_or_default()
    }

    async fn write_header(&mut self, slot: usize, value: i64) -> Result<()> {
        check_slot(slot)?;
        self.write_at((slot * 8) as u64, &value.to_le_bytes()).await?;
        self.header[slot] = value;
        Ok(())
    }

    async fn truncate(&mut self) -> Result<()> {
        self.file_mut()?
            .set_len(HEADER_SIZE as u64)
            .await
            .map_err(IndexError::io("page store truncate"))?;
        self.data_len = 0;
        Ok(())
    }

    async fn delete(&mut self) -> Result<()> {
        self.file = None;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IndexError::io("page store delete")(e)),
        }
    }

    async fn sync(&mut self) -> Result<()> {
        let file = self.file_mut()?;
        file.flush().await.map_err(IndexError::io("page store sync"))?;
        file.sync_all()
            .await
            .map_err(IndexError::io("page store sync"))
    }
}

/// Page store kept entirely in memory. Content survives `close`/`open` on the
/// same value but not the value itself.
#[derive(Debug, Default, Clone)]
pub struct MemoryPageStore {
    header: [i64; HEADER_SLOTS],
    data: Vec<u8>,
}

impl MemoryPageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageStore for MemoryPageStore {
    async fn create(&mut self) -> Result<()> {
        self.header = [0; HEADER_SLOTS];
        self.data.clear();
        Ok(())
    }

    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn allocate(&mut self, size: usize) -> Result<u64> {
        let offset = self.data.len() as u64;
        self.data.resize(self.data.len() + size, 0);
        Ok(offset)
    }

    async fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let start = offset as usize;
        self.data
            .get(start..start + len)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| out_of_bounds(offset, len, self.len()))
    }

    async fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let start = offset as usize;
        let data_len = self.len();
        let target = self
            .data
            .get_mut(start..start + bytes.len())
            .ok_or_else(|| out_of_bounds(offset, bytes.len(), data_len))?;
        target.copy_from_slice(bytes);
        Ok(())
    }

    fn read_header(&self, slot: usize) -> i64 {
        self.header.get(slot).copied().unwrap_or_default()
    }

    async fn write_header(&mut self, slot: usize, value: i64) -> Result<()> {
        check_slot(slot)?;
        self.header[slot] = value;
        Ok(())
    }

    async fn truncate(&mut self) -> Result<()> {
        self.data.clear();
        Ok(())
    }

    async fn delete(&mut self) -> Result<()> {
        self.header = [0; HEADER_SLOTS];
        self.data = Vec::new();
        Ok(())
    }

    async fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
