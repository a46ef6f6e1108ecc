//! The document store contract: wallpaper records and fetch cursors.
//!
//! The real document store is out of scope (specified only by interface);
//! [`SqliteStoreGateway`] is the reference implementation used at runtime
//! and in tests. `StoreGateway` is a trait so a different backend can be
//! substituted without touching the Fetcher or Pipeline.

pub mod sqlite;

pub use sqlite::SqliteStoreGateway;

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::error::StoreError;
use crate::model::{FetchCursor, StatusUpdate, WallpaperRecord};

#[async_trait]
pub trait StoreGateway: Send + Sync {
    async fn get_wallpaper(&self, id: &str) -> Result<Option<WallpaperRecord>, StoreError>;

    /// Fails with [`StoreError::AlreadyExists`] on id clash. Only called
    /// once the caller has confirmed absence via the dedup caches.
    async fn upsert_new(&self, record: WallpaperRecord) -> Result<(), StoreError>;

    async fn query_pending(
        &self,
        category: &str,
        limit: usize,
    ) -> Result<Vec<WallpaperRecord>, StoreError>;

    async fn update_status(&self, id: &str, update: StatusUpdate) -> Result<(), StoreError>;

    async fn get_cursor(&self, key: &str) -> Result<Option<FetchCursor>, StoreError>;

    async fn set_cursor(&self, key: &str, cursor: FetchCursor) -> Result<(), StoreError>;

    /// Pulls `{id, category, term, created_at}` for every record, used only
    /// for cold-start [`crate::cache::MetadataCache`] rehydration.
    async fn scan_metadata(&self) -> Result<Vec<crate::cache::metadata_cache::MetadataRow>, StoreError>;

    /// Returns the first record whose content hash matches exactly, used by
    /// the Pipeline as the store-side dedup fallback on a HashCache miss.
    async fn find_by_sha256(&self, sha256: &str) -> Result<Option<WallpaperRecord>, StoreError>;
}

/// Caller-side uniform random sample of up to `n` items from `rows`, used
/// over a streaming/indexed sample since the result set is always small
/// and bounded (`query_pending`'s own row limit).
pub fn sample_random(mut rows: Vec<WallpaperRecord>, n: usize) -> Vec<WallpaperRecord> {
    let mut rng = rand::thread_rng();
    rows.shuffle(&mut rng);
    rows.truncate(n);
    rows
}
