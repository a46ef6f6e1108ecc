//! Cursor persistence through a `StoreGateway`, independent of the
//! in-memory advance/exhaust math already covered in `src/model.rs`.

use wallbot::model::{cursor_key, FetchCursor};
use wallbot::store::sqlite::SqliteStoreGateway;
use wallbot::store::StoreGateway;

#[tokio::test]
async fn missing_cursor_defaults_to_none_not_initial() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStoreGateway::open(dir.path().join("store.db")).unwrap();
    let key = cursor_key("nature", "tree");
    assert!(store.get_cursor(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn cursor_advances_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let key = cursor_key("nature", "tree");

    {
        let store = SqliteStoreGateway::open(&path).unwrap();
        let cursor = FetchCursor::initial(1_000);
        let advanced = cursor.advanced(1_100);
        store.set_cursor(&key, advanced).await.unwrap();
    }

    let store = SqliteStoreGateway::open(&path).unwrap();
    let loaded = store.get_cursor(&key).await.unwrap().unwrap();
    assert_eq!(loaded.round, 2);
    assert_eq!(loaded.target, 200);
    assert_eq!(loaded.skip, 0);
}

#[tokio::test]
async fn exhausted_cursor_round_trips_its_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStoreGateway::open(dir.path().join("store.db")).unwrap();
    let key = cursor_key("vehicle", "car");
    let cursor = FetchCursor::initial(500).exhausted(600);
    store.set_cursor(&key, cursor).await.unwrap();
    let loaded = store.get_cursor(&key).await.unwrap().unwrap();
    assert_eq!(loaded.exhausted_at, Some(600));
    assert_eq!(loaded.round, 1);
}

#[tokio::test]
async fn distinct_terms_keep_independent_cursors() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStoreGateway::open(dir.path().join("store.db")).unwrap();
    let tree_key = cursor_key("nature", "tree");
    let water_key = cursor_key("nature", "water");
    store
        .set_cursor(&tree_key, FetchCursor::initial(0).advanced(1))
        .await
        .unwrap();
    assert!(store.get_cursor(&water_key).await.unwrap().is_none());
    let tree = store.get_cursor(&tree_key).await.unwrap().unwrap();
    assert_eq!(tree.round, 2);
}
