//! Error types for index operations.

/// Errors surfaced by the hash index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The directory or a page is in a state the structure can never produce.
    /// The index should be rebuilt.
    #[error("extendible hashing index is corrupted: {0}")]
    Corrupted(String),

    /// The encoded key can never fit a bucket page.
    #[error("key of {len} bytes exceeds the maximum of {max} bytes")]
    KeyTooLarge { len: usize, max: usize },

    /// A full bucket already uses all 64 hash bits and cannot be split.
    #[error("bucket at depth 64 is full, too many keys share one hash")]
    DepthExhausted,

    /// A page store operation failed. The in-memory directory may disagree with
    /// what is on disk.
    #[error("{context} failed")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("operation not supported by hash index: {0}")]
    Unsupported(&'static str),

    #[error("invalid index configuration: {0}")]
    InvalidConfig(String),

    #[error("index files belong to index {found}, expected {expected}")]
    IdentityMismatch {
        expected: uuid::Uuid,
        found: uuid::Uuid,
    },

    #[error("record source failed: {0}")]
    Source(String),

    #[error("error on rebuilding the index for clusters {clusters:?}")]
    Rebuild {
        clusters: Vec<String>,
        #[source]
        source: Box<IndexError>,
    },
}

impl IndexError {
    pub(crate) fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> IndexError {
        move |source| IndexError::Io { context, source }
    }
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            IndexError::KeyTooLarge { len: 90, max: 51 }.to_string(),
            "key of 90 bytes exceeds the maximum of 51 bytes"
        );
        assert_eq!(
            IndexError::Unsupported("keys").to_string(),
            "operation not supported by hash index: keys"
        );
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = IndexError::io("bucket read")(std::io::Error::other("disk gone"));
        assert_eq!(err.to_string(), "bucket read failed");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "disk gone");
    }

    #[test]
    fn test_rebuild_error_wraps_cause() {
        let err = IndexError::Rebuild {
            clusters: vec!["people".into()],
            source: Box::new(IndexError::Source("cursor closed".into())),
        };
        assert!(err.to_string().contains("people"));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "record source failed: cursor closed");
    }
}
