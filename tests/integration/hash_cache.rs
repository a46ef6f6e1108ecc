//! Black-box behavior of `HashCache` that spans a reopen, beyond the
//! single-session unit tests colocated with the implementation.

use wallbot::cache::HashCache;

#[tokio::test]
async fn entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hashes.db");

    {
        let cache = HashCache::open(&path, 1000).unwrap();
        cache.insert("deadbeef", "w1").await.unwrap();
    }

    let cache = HashCache::open(&path, 1000).unwrap();
    assert_eq!(cache.lookup("deadbeef").await.unwrap(), Some("w1".to_string()));
}

#[tokio::test]
async fn eviction_keeps_most_recently_accessed_rows() {
    let dir = tempfile::tempdir().unwrap();
    let cache = HashCache::open(dir.path().join("hashes.db"), 10).unwrap();
    for i in 0..9 {
        cache.insert(&format!("h{i}"), &format!("w{i}")).await.unwrap();
    }
    // touch h0 so it is the most recently accessed row before the new insert
    // pushes the cache over its high-water mark.
    cache.lookup("h0").await.unwrap();
    cache.insert("h9", "w9").await.unwrap();
    cache.cleanup().await.unwrap();

    assert_eq!(cache.lookup("h0").await.unwrap(), Some("w0".to_string()));
}

#[tokio::test]
async fn integrity_check_survives_many_upserts() {
    let dir = tempfile::tempdir().unwrap();
    let cache = HashCache::open(dir.path().join("hashes.db"), 1000).unwrap();
    for i in 0..50 {
        cache.insert(&format!("h{i}"), &format!("w{i}")).await.unwrap();
        cache.insert(&format!("h{i}"), &format!("w{i}-updated")).await.unwrap();
    }
    cache.integrity_check().await.unwrap();
    cache.close().await.unwrap();
}
