/// Little endian cursor helpers shared by the page codecs.
use crate::error::{IndexError, Result};

pub trait ByteLength {
    fn byte_len(&self) -> usize;
}

pub trait IntoBytes {
    fn write_bytes(&self, out: &mut Vec<u8>);

    fn to_bytes(&self) -> Vec<u8>
    where
        Self: ByteLength,
    {
        let mut out = Vec::with_capacity(self.byte_len());
        self.write_bytes(&mut out);
        out
    }
}

pub trait FromBytes: Sized {
    fn from_bytes(reader: &mut ByteReader<'_>) -> Result<Self>;
}

/// Reads fixed width little endian scalars out of a page, failing with
/// [`IndexError::Corrupted`] instead of panicking on short input.
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8], what: &'static str) -> Self {
        Self { bytes, pos: 0, what }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(IndexError::Corrupted(format!(
                "{} truncated: wanted {} bytes at offset {}, {} left",
                self.what,
                len,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_reads_scalars_in_order() {
        let mut bytes = vec![7u8];
        bytes.extend(300u16.to_le_bytes());
        bytes.extend((-5i64).to_le_bytes());
        let mut reader = ByteReader::new(&bytes, "sample");
        assert_eq!(reader.u8().unwrap(), 7);
        assert_eq!(reader.u16().unwrap(), 300);
        assert_eq!(reader.i64().unwrap(), -5);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_reader_reports_truncation() {
        let bytes = [1u8, 2, 3];
        let mut reader = ByteReader::new(&bytes, "sample");
        let err = reader.u64().unwrap_err();
        assert!(matches!(err, IndexError::Corrupted(msg) if msg.contains("sample truncated")));
    }
}
