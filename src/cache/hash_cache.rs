//! `sha256 -> wallpaper_id` dedup cache with LRU-style eviction.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{error, info};

use crate::error::CacheError;

use super::apply_stability_pragmas;

/// High-water mark: cleanup runs once row count exceeds this fraction of
/// capacity, and evicts down to the low-water mark below.
const HIGH_WATER: f64 = 0.90;
const LOW_WATER: f64 = 0.70;

pub struct HashCache {
    conn: Arc<Mutex<Connection>>,
    max_rows: usize,
}

impl HashCache {
    pub fn open(path: impl AsRef<Path>, max_rows: usize) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        apply_stability_pragmas(&conn)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS hashes (
                sha256 TEXT PRIMARY KEY,
                wallpaper_id TEXT NOT NULL,
                last_accessed INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_hashes_last_accessed ON hashes (last_accessed)",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_rows,
        })
    }

    /// Runs entirely on a blocking-pool thread so the caller's async task
    /// never stalls on file I/O.
    pub async fn lookup(&self, sha256: &str) -> Result<Option<String>, CacheError> {
        let conn = self.conn.clone();
        let sha256 = sha256.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let now = now_secs();
            let result: Option<String> = conn
                .query_row(
                    "SELECT wallpaper_id FROM hashes WHERE sha256 = ?1",
                    params![sha256],
                    |row| row.get(0),
                )
                .optional()?;
            if result.is_some() {
                conn.execute(
                    "UPDATE hashes SET last_accessed = ?1 WHERE sha256 = ?2",
                    params![now, sha256],
                )?;
            }
            Ok(result)
        })
        .await
        .expect("blocking task panicked")
    }

    pub async fn insert(&self, sha256: &str, wallpaper_id: &str) -> Result<(), CacheError> {
        let conn = self.conn.clone();
        let sha256 = sha256.to_string();
        let wallpaper_id = wallpaper_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let now = now_secs();
            conn.execute(
                "INSERT INTO hashes (sha256, wallpaper_id, last_accessed) VALUES (?1, ?2, ?3)
                 ON CONFLICT(sha256) DO UPDATE SET wallpaper_id = excluded.wallpaper_id,
                    last_accessed = excluded.last_accessed",
                params![sha256, wallpaper_id, now],
            )?;
            Ok(())
        })
        .await
        .expect("blocking task panicked")
    }

    /// Evicts the oldest-accessed rows once above the high-water mark,
    /// leaving the low-water mark worth of rows behind.
    pub async fn cleanup(&self) -> Result<u64, CacheError> {
        let conn = self.conn.clone();
        let max_rows = self.max_rows;
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM hashes", [], |row| row.get(0))?;
            let high = (max_rows as f64 * HIGH_WATER) as i64;
            if count <= high {
                return Ok(0);
            }
            let low = (max_rows as f64 * LOW_WATER) as i64;
            let to_evict = count - low;
            let evicted = conn.execute(
                "DELETE FROM hashes WHERE sha256 IN (
                    SELECT sha256 FROM hashes ORDER BY last_accessed ASC LIMIT ?1
                )",
                params![to_evict],
            )?;
            info!(evicted, "hash cache cleanup evicted rows");
            Ok(evicted as u64)
        })
        .await
        .expect("blocking task panicked")
    }

    /// Runs SQLite's own integrity check; a corrupt store is a fatal
    /// condition the caller must surface and rebuild from.
    pub async fn integrity_check(&self) -> Result<(), CacheError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let result: String =
                conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
            if result != "ok" {
                error!(result = %result, "hash cache failed integrity check");
                return Err(CacheError::Corruption(result));
            }
            Ok(())
        })
        .await
        .expect("blocking task panicked")
    }

    /// Refreshes the query planner's statistics and reclaims free pages.
    /// Run on the weekly maintenance cadence as well as at shutdown, so a
    /// long-lived process gets this without waiting for a restart.
    pub async fn analyze_and_vacuum(&self) -> Result<(), CacheError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            conn.execute_batch("ANALYZE; PRAGMA incremental_vacuum;")?;
            Ok(())
        })
        .await
        .expect("blocking task panicked")
    }

    /// Finalizes the database before shutdown.
    pub async fn close(&self) -> Result<(), CacheError> {
        self.analyze_and_vacuum().await
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_then_lookup_hits() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HashCache::open(dir.path().join("hash.db"), 1000).unwrap();
        cache.insert("abc", "w1").await.unwrap();
        assert_eq!(cache.lookup("abc").await.unwrap(), Some("w1".to_string()));
        assert_eq!(cache.lookup("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn insert_upserts_existing_hash() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HashCache::open(dir.path().join("hash.db"), 1000).unwrap();
        cache.insert("abc", "w1").await.unwrap();
        cache.insert("abc", "w2").await.unwrap();
        assert_eq!(cache.lookup("abc").await.unwrap(), Some("w2".to_string()));
    }

    #[tokio::test]
    async fn cleanup_evicts_down_to_low_water_mark() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HashCache::open(dir.path().join("hash.db"), 10).unwrap();
        for i in 0..10 {
            cache.insert(&format!("h{i}"), &format!("w{i}")).await.unwrap();
        }
        let evicted = cache.cleanup().await.unwrap();
        assert!(evicted > 0);
        let remaining: i64 = {
            let conn = cache.conn.lock();
            conn.query_row("SELECT COUNT(*) FROM hashes", [], |row| row.get(0))
                .unwrap()
        };
        assert!(remaining as f64 <= 10.0 * LOW_WATER + 1.0);
    }

    #[tokio::test]
    async fn integrity_check_passes_on_fresh_db() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HashCache::open(dir.path().join("hash.db"), 1000).unwrap();
        cache.integrity_check().await.unwrap();
    }
}
