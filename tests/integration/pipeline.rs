//! Pipeline behavior reachable without live HTTP: empty-queue short-circuit
//! and cooperative shutdown. Upload and download paths need a real or mocked
//! chat/source endpoint and are exercised manually, not in this suite.

use std::sync::Arc;

use wallbot::cache::HashCache;
use wallbot::chat_client::ChatClient;
use wallbot::pipeline::Pipeline;
use wallbot::shutdown::ShutdownSignal;
use wallbot::store::{SqliteStoreGateway, StoreGateway};

fn pipeline(dir: &std::path::Path) -> Pipeline {
    let store: Arc<dyn StoreGateway> =
        Arc::new(SqliteStoreGateway::open(dir.join("store.db")).unwrap());
    let hash_cache = Arc::new(HashCache::open(dir.join("hashes.db"), 1000).unwrap());
    let chat = ChatClient::new("test-token".into());
    Pipeline::new(store, hash_cache, chat, dir.to_path_buf(), ShutdownSignal::new())
}

#[tokio::test]
async fn run_once_is_a_no_op_when_nothing_is_pending() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path());
    // No panic, no network attempted: query_pending returns empty and the
    // cycle returns before reaching the download stage.
    pipeline.run_once("nature", 1234).await;
}

#[tokio::test]
async fn run_once_returns_immediately_once_shutdown_is_triggered() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn StoreGateway> =
        Arc::new(SqliteStoreGateway::open(dir.path().join("store.db")).unwrap());
    let hash_cache = Arc::new(HashCache::open(dir.path().join("hashes.db"), 1000).unwrap());
    let chat = ChatClient::new("test-token".into());
    let shutdown = ShutdownSignal::new();
    shutdown.trigger();
    let pipeline = Pipeline::new(store.clone(), hash_cache, chat, dir.path().to_path_buf(), shutdown);

    // Seed a pending record so an un-triggered run would have work to do.
    store
        .upsert_new(wallbot::model::WallpaperRecord::new_link_added(
            "w1".into(),
            "nature".into(),
            "tree".into(),
            "https://wallhaven.cc/w/w1".into(),
            "https://w.wallhaven.cc/full/w1.jpg".into(),
            vec![],
            wallbot::model::Purity::Safe,
            0,
        ))
        .await
        .unwrap();

    pipeline.run_once("nature", 1234).await;

    let record = store.get_wallpaper("w1").await.unwrap().unwrap();
    assert_eq!(record.status, wallbot::model::WallpaperStatus::LinkAdded);
}
