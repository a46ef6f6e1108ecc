//! Cold-start rehydration scenario: metadata cache starts empty, is loaded
//! once from a simulated store scan, and a second load is a no-op.

use wallbot::cache::metadata_cache::{MetadataCache, MetadataRow};

fn rows() -> Vec<MetadataRow> {
    vec![
        MetadataRow {
            wallpaper_id: "w1".into(),
            category: "nature".into(),
            search_term: "tree".into(),
            created_at: 100,
        },
        MetadataRow {
            wallpaper_id: "w2".into(),
            category: "nature".into(),
            search_term: "water".into(),
            created_at: 200,
        },
    ]
}

#[tokio::test]
async fn cold_start_rehydration_populates_cache_once() {
    let dir = tempfile::tempdir().unwrap();
    let cache = MetadataCache::open(dir.path().join("metadata.db"), 1000).unwrap();

    assert_eq!(cache.row_count().await.unwrap(), 0);
    cache.bulk_load(rows()).await.unwrap();
    assert_eq!(cache.row_count().await.unwrap(), 2);
    assert!(cache.contains("w1").await.unwrap());
    assert!(cache.contains("w2").await.unwrap());
    assert!(!cache.contains("w3").await.unwrap());
}

#[tokio::test]
async fn repeated_rehydration_does_not_duplicate_rows() {
    let dir = tempfile::tempdir().unwrap();
    let cache = MetadataCache::open(dir.path().join("metadata.db"), 1000).unwrap();
    cache.bulk_load(rows()).await.unwrap();
    cache.bulk_load(rows()).await.unwrap();
    cache.bulk_load(rows()).await.unwrap();
    assert_eq!(cache.row_count().await.unwrap(), 2);
}

#[tokio::test]
async fn cache_survives_reopen_after_rehydration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.db");
    {
        let cache = MetadataCache::open(&path, 1000).unwrap();
        cache.bulk_load(rows()).await.unwrap();
    }
    let cache = MetadataCache::open(&path, 1000).unwrap();
    assert_eq!(cache.row_count().await.unwrap(), 2);
}
