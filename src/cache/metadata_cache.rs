//! Known-`wallpaper_id` cache used to skip a store round-trip on rediscovery.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::{error, info};

use crate::error::CacheError;

use super::apply_stability_pragmas;

const HIGH_WATER: f64 = 0.90;
const LOW_WATER: f64 = 0.70;

/// One row pulled from the store during cold-start rehydration.
#[derive(Debug, Clone)]
pub struct MetadataRow {
    pub wallpaper_id: String,
    pub category: String,
    pub search_term: String,
    pub created_at: i64,
}

pub struct MetadataCache {
    conn: Arc<Mutex<Connection>>,
    max_rows: usize,
}

impl MetadataCache {
    pub fn open(path: impl AsRef<Path>, max_rows: usize) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        apply_stability_pragmas(&conn)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                wallpaper_id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                search_term TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_accessed INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_metadata_last_accessed ON metadata (last_accessed)",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_rows,
        })
    }

    pub async fn row_count(&self) -> Result<i64, CacheError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            Ok(conn.query_row("SELECT COUNT(*) FROM metadata", [], |row| row.get(0))?)
        })
        .await
        .expect("blocking task panicked")
    }

    pub async fn contains(&self, wallpaper_id: &str) -> Result<bool, CacheError> {
        let conn = self.conn.clone();
        let wallpaper_id = wallpaper_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let now = now_secs();
            let affected = conn.execute(
                "UPDATE metadata SET last_accessed = ?1 WHERE wallpaper_id = ?2",
                params![now, wallpaper_id],
            )?;
            Ok(affected > 0)
        })
        .await
        .expect("blocking task panicked")
    }

    pub async fn insert(
        &self,
        wallpaper_id: &str,
        category: &str,
        search_term: &str,
        created_at: i64,
    ) -> Result<(), CacheError> {
        let conn = self.conn.clone();
        let (wallpaper_id, category, search_term) = (
            wallpaper_id.to_string(),
            category.to_string(),
            search_term.to_string(),
        );
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let now = now_secs();
            conn.execute(
                "INSERT INTO metadata (wallpaper_id, category, search_term, created_at, last_accessed)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(wallpaper_id) DO UPDATE SET last_accessed = excluded.last_accessed",
                params![wallpaper_id, category, search_term, created_at, now],
            )?;
            Ok(())
        })
        .await
        .expect("blocking task panicked")
    }

    /// Idempotent bulk insert used for cold-start rehydration: safe to call
    /// repeatedly without creating duplicate or conflicting rows.
    pub async fn bulk_load(&self, rows: Vec<MetadataRow>) -> Result<(), CacheError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            let tx = conn.transaction()?;
            let now = now_secs();
            for row in rows {
                tx.execute(
                    "INSERT INTO metadata (wallpaper_id, category, search_term, created_at, last_accessed)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(wallpaper_id) DO UPDATE SET
                        category = excluded.category,
                        search_term = excluded.search_term,
                        created_at = excluded.created_at",
                    params![row.wallpaper_id, row.category, row.search_term, row.created_at, now],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .expect("blocking task panicked")
    }

    pub async fn cleanup(&self) -> Result<u64, CacheError> {
        let conn = self.conn.clone();
        let max_rows = self.max_rows;
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM metadata", [], |row| row.get(0))?;
            let high = (max_rows as f64 * HIGH_WATER) as i64;
            if count <= high {
                return Ok(0);
            }
            let low = (max_rows as f64 * LOW_WATER) as i64;
            let to_evict = count - low;
            let evicted = conn.execute(
                "DELETE FROM metadata WHERE wallpaper_id IN (
                    SELECT wallpaper_id FROM metadata ORDER BY last_accessed ASC LIMIT ?1
                )",
                params![to_evict],
            )?;
            info!(evicted, "metadata cache cleanup evicted rows");
            Ok(evicted as u64)
        })
        .await
        .expect("blocking task panicked")
    }

    pub async fn integrity_check(&self) -> Result<(), CacheError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let result: String =
                conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
            if result != "ok" {
                error!(result = %result, "metadata cache failed integrity check");
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
