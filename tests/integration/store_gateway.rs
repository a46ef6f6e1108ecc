//! End-to-end record lifecycle against `SqliteStoreGateway`, exercising the
//! status transitions the Fetcher and Pipeline drive in production.

use wallbot::model::{Purity, StatusUpdate, WallpaperRecord, WallpaperStatus};
use wallbot::store::{SqliteStoreGateway, StoreGateway};

fn candidate(id: &str, category: &str) -> WallpaperRecord {
    WallpaperRecord::new_link_added(
        id.into(),
        category.into(),
        "tree".into(),
        format!("https://wallhaven.cc/w/{id}"),
        format!("https://w.wallhaven.cc/full/{id}.jpg"),
        vec!["forest".into(), "sunset".into()],
        Purity::Safe,
        1_700_000_000,
    )
}

#[tokio::test]
async fn full_lifecycle_link_added_to_posted() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStoreGateway::open(dir.path().join("store.db")).unwrap();

    store.upsert_new(candidate("w1", "nature")).await.unwrap();
    let pending = store.query_pending("nature", 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, WallpaperStatus::LinkAdded);

    store
        .update_status(
            "w1",
            StatusUpdate::Posted {
                sha256: "abc123".into(),
                tg: Default::default(),
            },
        )
        .await
        .unwrap();

    let pending_after = store.query_pending("nature", 10).await.unwrap();
    assert!(pending_after.is_empty());

    let record = store.get_wallpaper("w1").await.unwrap().unwrap();
    assert_eq!(record.status, WallpaperStatus::Posted);
    assert_eq!(record.sha256.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn skipped_record_carries_the_matching_id_in_failure_reason() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStoreGateway::open(dir.path().join("store.db")).unwrap();
    store.upsert_new(candidate("w1", "nature")).await.unwrap();
    store.upsert_new(candidate("w2", "nature")).await.unwrap();

    store
        .update_status(
            "w2",
            StatusUpdate::Skipped {
                matched_wallpaper_id: "w1".into(),
                tg: None,
            },
        )
        .await
        .unwrap();

    let record = store.get_wallpaper("w2").await.unwrap().unwrap();
    assert_eq!(record.status, WallpaperStatus::Skipped);
    assert_eq!(record.failure_reason.as_deref(), Some("SHA256_match_cached:w1"));
}

#[tokio::test]
async fn scan_metadata_reflects_every_upserted_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStoreGateway::open(dir.path().join("store.db")).unwrap();
    store.upsert_new(candidate("w1", "nature")).await.unwrap();
    store.upsert_new(candidate("w2", "vehicle")).await.unwrap();

    let rows = store.scan_metadata().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| r.wallpaper_id == "w1" && r.category == "nature"));
    assert!(rows.iter().any(|r| r.wallpaper_id == "w2" && r.category == "vehicle"));
}

#[tokio::test]
async fn query_pending_never_returns_terminal_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStoreGateway::open(dir.path().join("store.db")).unwrap();
    store.upsert_new(candidate("w1", "nature")).await.unwrap();
    store.upsert_new(candidate("w2", "nature")).await.unwrap();
    store
        .update_status(
            "w1",
            StatusUpdate::Failed {
                sha256: None,
                reason: "Download failed".into(),
                tg: None,
            },
        )
        .await
        .unwrap();

    let pending = store.query_pending("nature", 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].wallpaper_id, "w2");
}
