use std::path::Path;

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::hash_index::HashIndex;
use crate::page_store::FilePageStore;

pub const DEFAULT_INDEX_DIR: &str = ".";

pub const DEFAULT_INDEX_NAME: &str = "index";

/// Opens the index stored under `dir`, creating it when its bucket file does
/// not exist yet.
pub async fn setup_index(dir: &Path, name: &str) -> Result<HashIndex<FilePageStore>> {
    let config = IndexConfig::new(name);
    config.validate()?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(IndexError::io("index directory create"))?;

    if FilePageStore::new(config.bucket_file(dir)).exists().await {
        HashIndex::open_in_dir(config, dir).await
    } else {
        HashIndex::create_in_dir(config, dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::RecordId;

    #[tokio::test]
    async fn test_setup_reopens_existing_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = setup_index(dir.path(), "people").await.unwrap();
        index.put("ada", RecordId::new(4, 2)).await.unwrap();
        let identity = index.identity();
        index.close().await.unwrap();

        let index = setup_index(dir.path(), "people").await.unwrap();
        assert_eq!(index.identity(), identity);
        assert_eq!(index.get("ada").await.unwrap(), Some(RecordId::new(4, 2)));
    }
}
