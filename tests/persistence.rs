mod common;

use ehindex::{HashIndex, IndexConfig, IndexError, RecordId};

#[tokio::test]
async fn test_reopen_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = IndexConfig::new("people").bucket_capacity(8);

    let index = HashIndex::create_in_dir(config.clone(), dir.path())
        .await
        .unwrap();
    for i in 0..3000i64 {
        index.put(&i, RecordId::new(5, i)).await.unwrap();
    }
    for i in (0..3000i64).step_by(3) {
        assert!(index.remove(&i).await.unwrap());
    }
    let identity = index.identity();
    let stats = index.stats().await.unwrap();
    index.close().await.unwrap();

    let index = HashIndex::open_in_dir(config, dir.path()).await.unwrap();
    assert_eq!(index.identity(), identity);
    assert_eq!(index.stats().await.unwrap(), stats);
    for i in 0..3000i64 {
        let expected = (i % 3 != 0).then_some(RecordId::new(5, i));
        assert_eq!(index.get(&i).await.unwrap(), expected);
    }
    index.verify().await.unwrap();

    // the reopened index keeps splitting and merging where it left off
    for i in 3000..4000i64 {
        index.put(&i, RecordId::new(5, i)).await.unwrap();
    }
    index.verify().await.unwrap();
}

#[tokio::test]
async fn test_stored_geometry_wins_over_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = IndexConfig::new("geo").page_size(1024).bucket_capacity(10);
    let index = HashIndex::create_in_dir(config, dir.path()).await.unwrap();
    index.put("x", RecordId::new(1, 1)).await.unwrap();
    index.close().await.unwrap();

    let index = HashIndex::open_in_dir(IndexConfig::new("geo"), dir.path())
        .await
        .unwrap();
    assert_eq!(index.config().page_size, 1024);
    assert_eq!(index.config().bucket_capacity, 10);
    assert_eq!(index.get("x").await.unwrap(), Some(RecordId::new(1, 1)));
}

#[tokio::test]
async fn test_tree_state_of_another_index_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let a = IndexConfig::new("a");
    let b = IndexConfig::new("b");
    HashIndex::create_in_dir(a.clone(), dir.path())
        .await
        .unwrap()
        .close()
        .await
        .unwrap();
    HashIndex::create_in_dir(b.clone(), dir.path())
        .await
        .unwrap()
        .close()
        .await
        .unwrap();

    std::fs::copy(b.tree_state_file(dir.path()), a.tree_state_file(dir.path())).unwrap();
    assert!(matches!(
        HashIndex::open_in_dir(a, dir.path()).await,
        Err(IndexError::IdentityMismatch { .. })
    ));
}

#[tokio::test]
async fn test_open_missing_index_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        HashIndex::open_in_dir(IndexConfig::new("nothing"), dir.path()).await,
        Err(IndexError::Io { .. })
    ));
}

#[tokio::test]
async fn test_delete_removes_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = IndexConfig::new("doomed");
    let index = HashIndex::create_in_dir(config.clone(), dir.path())
        .await
        .unwrap();
    index.put("x", RecordId::new(1, 1)).await.unwrap();
    index.delete().await.unwrap();

    assert!(!config.bucket_file(dir.path()).exists());
    assert!(!config.tree_state_file(dir.path()).exists());
}

#[tokio::test]
async fn test_clear_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = IndexConfig::new("cleared").bucket_capacity(4).page_size(512);
    let index = HashIndex::create_in_dir(config.clone(), dir.path())
        .await
        .unwrap();
    for i in 0..500i64 {
        index.put(&i, RecordId::new(1, i)).await.unwrap();
    }
    index.clear().await.unwrap();
    index.put(&1i64, RecordId::new(9, 9)).await.unwrap();
    index.close().await.unwrap();

    let index = HashIndex::open_in_dir(config, dir.path()).await.unwrap();
    assert_eq!(index.size().await, 1);
    assert_eq!(index.get(&1i64).await.unwrap(), Some(RecordId::new(9, 9)));
    assert_eq!(index.stats().await.unwrap().live_nodes, 1);
    index.verify().await.unwrap();
}
