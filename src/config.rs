//! Configuration for a single hash index.

use std::path::{Path, PathBuf};

use crate::consts::*;
use crate::error::{IndexError, Result};

/// Configuration for a hash index instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Name of the index, used to derive its file names.
    pub name: String,

    /// Size in bytes of one bucket page.
    /// Default: 4096
    pub page_size: usize,

    /// Maximum number of entries held by one bucket before it splits.
    /// Default: 64
    pub bucket_capacity: usize,

    /// Record collections walked by `rebuild`.
    pub clusters: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: "index".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
            clusters: Vec::new(),
        }
    }
}

impl IndexConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn bucket_capacity(mut self, capacity: usize) -> Self {
        self.bucket_capacity = capacity;
        self
    }

    /// Add a record collection to be indexed on rebuild.
    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        let cluster = cluster.into();
        if !self.clusters.contains(&cluster) {
            self.clusters.push(cluster);
        }
        self
    }

    /// Largest encoded key for which a bucket holding `bucket_capacity`
    /// entries still fits in one page.
    pub fn max_key_size(&self) -> usize {
        if self.bucket_capacity == 0 || self.page_size <= BUCKET_HEADER {
            return 0;
        }
        let per_entry = (self.page_size - BUCKET_HEADER) / self.bucket_capacity;
        per_entry.saturating_sub(ENTRY_OVERHEAD).min(u16::MAX as usize)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains(['/', '\\']) {
            return Err(IndexError::InvalidConfig(format!(
                "index name {:?} cannot be used as a file name",
                self.name
            )));
        }
        if self.bucket_capacity < 2 || self.bucket_capacity > u16::MAX as usize {
            return Err(IndexError::InvalidConfig(format!(
                "bucket capacity must be between 2 and {}, got {}",
                u16::MAX,
                self.bucket_capacity
            )));
        }
        if self.page_size > i32::MAX as usize {
            return Err(IndexError::InvalidConfig(format!(
                "page size {} is too large",
                self.page_size
            )));
        }
        if self.max_key_size() == 0 {
            return Err(IndexError::InvalidConfig(format!(
                "page size {} cannot hold {} entries",
                self.page_size, self.bucket_capacity
            )));
        }
        Ok(())
    }

    pub fn bucket_file(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", self.name, BUCKET_FILE_EXTENSION))
    }

    pub fn tree_state_file(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", self.name, TREE_STATE_FILE_EXTENSION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IndexConfig::default();
        config.validate().unwrap();
        // (4096 - 12) / 64 = 63, minus 12 bytes of entry overhead
        assert_eq!(config.max_key_size(), 51);
    }

    #[test]
    fn test_page_too_small_for_capacity() {
        let config = IndexConfig::new("tiny").page_size(256).bucket_capacity(64);
        assert_eq!(config.max_key_size(), 0);
        assert!(matches!(
            config.validate(),
            Err(IndexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_path_like_names() {
        let config = IndexConfig::new("../escape");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_clusters_are_deduplicated() {
        let config = IndexConfig::new("people").cluster("person").cluster("person");
        assert_eq!(config.clusters, vec!["person".to_string()]);
    }

    #[test]
    fn test_file_names() {
        let config = IndexConfig::new("people");
        let dir = Path::new("/data");
        assert_eq!(config.bucket_file(dir), PathBuf::from("/data/people.obf"));
        assert_eq!(config.tree_state_file(dir), PathBuf::from("/data/people.tsc"));
    }
}
