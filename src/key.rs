/// Canonical byte encoding for index keys and the record references they map to.
use std::fmt;
use std::str::FromStr;

use crate::bytes::{ByteLength, ByteReader, FromBytes, IntoBytes};
use crate::error::Result;

const TAG_INT: u8 = 1;
const TAG_STR: u8 = 2;
const TAG_BYTES: u8 = 3;
const TAG_COMPOSITE: u8 = 4;

/// Anything that can be turned into the canonical byte form used for
/// hashing and equality inside buckets.
///
/// Two keys are the same index key exactly when their encodings are equal.
pub trait EncodeKey {
    fn encode_key(&self, out: &mut Vec<u8>);

    fn encoded_key(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_key(&mut out);
        out
    }
}

/// A typed index key, either simple or composite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    Composite(Vec<Key>),
}

fn encode_len_prefixed(tag: u8, bytes: &[u8], out: &mut Vec<u8>) {
    out.push(tag);
    out.extend((bytes.len() as u32).to_le_bytes());
    out.extend(bytes);
}

impl EncodeKey for Key {
    fn encode_key(&self, out: &mut Vec<u8>) {
        match self {
            Key::Int(value) => value.encode_key(out),
            Key::Str(value) => value.as_str().encode_key(out),
            Key::Bytes(value) => value.as_slice().encode_key(out),
            Key::Composite(parts) => {
                out.push(TAG_COMPOSITE);
                out.extend((parts.len() as u16).to_le_bytes());
                for part in parts {
                    part.encode_key(out);
                }
            }
        }
    }
}

impl EncodeKey for i64 {
    fn encode_key(&self, out: &mut Vec<u8>) {
        out.push(TAG_INT);
        // big endian keeps the value's top bits first, which test hashers rely on
        out.extend(self.to_be_bytes());
    }
}

impl EncodeKey for str {
    fn encode_key(&self, out: &mut Vec<u8>) {
        encode_len_prefixed(TAG_STR, self.as_bytes(), out);
    }
}

impl EncodeKey for String {
    fn encode_key(&self, out: &mut Vec<u8>) {
        self.as_str().encode_key(out);
    }
}

impl EncodeKey for [u8] {
    fn encode_key(&self, out: &mut Vec<u8>) {
        encode_len_prefixed(TAG_BYTES, self, out);
    }
}

impl EncodeKey for Vec<u8> {
    fn encode_key(&self, out: &mut Vec<u8>) {
        self.as_slice().encode_key(out);
    }
}

impl<T: EncodeKey + ?Sized> EncodeKey for &T {
    fn encode_key(&self, out: &mut Vec<u8>) {
        (**self).encode_key(out);
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value)
    }
}

impl From<Vec<u8>> for Key {
    fn from(value: Vec<u8>) -> Self {
        Key::Bytes(value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(value) => write!(f, "{}", value),
            Key::Str(value) => write!(f, "{:?}", value),
            Key::Bytes(value) => write!(f, "{:02x?}", value),
            Key::Composite(parts) => {
                write!(f, "[")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", part)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Identity of the record an index entry points at: cluster id and
/// position inside the cluster. Printed as `#cluster:position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub cluster: i16,
    pub position: i64,
}

impl RecordId {
    pub const fn new(cluster: i16, position: i64) -> Self {
        Self { cluster, position }
    }
}

impl ByteLength for RecordId {
    fn byte_len(&self) -> usize {
        2 + 8
    }
}

impl IntoBytes for RecordId {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend(self.cluster.to_le_bytes());
        out.extend(self.position.to_le_bytes());
    }
}

impl FromBytes for RecordId {
    fn from_bytes(reader: &mut ByteReader<'_>) -> Result<Self> {
        let cluster = reader.i16()?;
        let position = reader.i64()?;
        Ok(RecordId { cluster, position })
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.cluster, self.position)
    }
}

impl FromStr for RecordId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let body = s
            .strip_prefix('#')
            .ok_or_else(|| format!("Record id must start with '#': {}", s))?;
        let (cluster, position) = body
            .split_once(':')
            .ok_or_else(|| format!("Record id must look like #cluster:position: {}", s))?;
        let cluster = cluster
            .parse::<i16>()
            .map_err(|e| format!("Invalid cluster id {}: {}", cluster, e))?;
        let position = position
            .parse::<i64>()
            .map_err(|e| format!("Invalid cluster position {}: {}", position, e))?;
        Ok(RecordId { cluster, position })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_key_matches_native_encoding() {
        assert_eq!(Key::Int(42).encoded_key(), 42i64.encoded_key());
        assert_eq!(Key::from("abc").encoded_key(), "abc".encoded_key());
        assert_eq!(
            Key::Bytes(vec![1, 2]).encoded_key(),
            vec![1u8, 2].encoded_key()
        );
    }

    #[test]
    fn test_types_do_not_collide() {
        // the string "1" and the bytes [b'1'] must stay distinct keys
        assert_ne!("1".encoded_key(), b"1".to_vec().encoded_key());
        assert_ne!(
            Key::Composite(vec![Key::Int(1), Key::Int(2)]).encoded_key(),
            Key::Composite(vec![Key::Int(2), Key::Int(1)]).encoded_key()
        );
    }

    #[test]
    fn test_int_encoding_is_big_endian() {
        let encoded = 0x0102_0304_0506_0708i64.encoded_key();
        assert_eq!(encoded, vec![TAG_INT, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_record_id_parse_and_display() {
        let rid: RecordId = "#12:3456".parse().unwrap();
        assert_eq!(rid, RecordId::new(12, 3456));
        assert_eq!(rid.to_string(), "#12:3456");
        assert!("12:3456".parse::<RecordId>().is_err());
        assert!("#12".parse::<RecordId>().is_err());
        assert!("#x:1".parse::<RecordId>().is_err());
    }

    #[test]
    fn test_record_id_bytes() {
        let rid = RecordId::new(-3, 99);
        let bytes = rid.to_bytes();
        assert_eq!(bytes.len(), rid.byte_len());
        let mut reader = ByteReader::new(&bytes, "rid");
        assert_eq!(RecordId::from_bytes(&mut reader).unwrap(), rid);
    }
}
