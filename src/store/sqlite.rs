//! SQLite-backed [`StoreGateway`] reference implementation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::cache::metadata_cache::MetadataRow;
use crate::error::StoreError;
use crate::model::{FetchCursor, Purity, StatusUpdate, WallpaperRecord, WallpaperStatus};
use crate::retry::retry_with_backoff;

use super::StoreGateway;

const WRITE_RETRY_ATTEMPTS: u32 = 3;
const WRITE_RETRY_INITIAL_DELAY: Duration = Duration::from_secs(5);
const READ_RETRY_INITIAL_DELAY: Duration = Duration::from_secs(60);

pub struct SqliteStoreGateway {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStoreGateway {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS wallpapers (
                wallpaper_id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                search_term TEXT NOT NULL,
                wallpaper_url TEXT NOT NULL,
                image_url TEXT NOT NULL,
                tags TEXT NOT NULL,
                purity TEXT NOT NULL,
                safe INTEGER NOT NULL,
                status TEXT NOT NULL,
                sha256 TEXT,
                tg_response TEXT,
                failure_reason TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_wallpapers_category_status
                ON wallpapers (category, status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_wallpapers_sha256 ON wallpapers (sha256)",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cursors (
                key TEXT PRIMARY KEY,
                round INTEGER NOT NULL,
                target INTEGER NOT NULL,
                skip INTEGER NOT NULL,
                last_updated INTEGER NOT NULL,
                exhausted_at INTEGER
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<WallpaperRecord> {
        let tags_json: String = row.get("tags")?;
        let tg_json: Option<String> = row.get("tg_response")?;
        let status_str: String = row.get("status")?;
        let purity_str: String = row.get("purity")?;
        Ok(WallpaperRecord {
            wallpaper_id: row.get("wallpaper_id")?,
            category: row.get("category")?,
            search_term: row.get("search_term")?,
            wallpaper_url: row.get("wallpaper_url")?,
            image_url: row.get("image_url")?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            purity: Purity::from_db_str(&purity_str),
            safe: row.get::<_, i64>("safe")? != 0,
            status: WallpaperStatus::from_db_str(&status_str)
                .unwrap_or(WallpaperStatus::LinkAdded),
            sha256: row.get("sha256")?,
            tg_response: tg_json.and_then(|s| serde_json::from_str(&s).ok()),
            failure_reason: row.get("failure_reason")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Classifies a [`StoreError`] as worth retrying. `QuotaExceeded` and the
/// SQLite busy/locked codes (the closest local analogue to a document
/// store's rate limiting) are retryable; everything else propagates.
fn is_retryable(err: &StoreError) -> bool {
    matches!(err, StoreError::QuotaExceeded | StoreError::Retryable(_))
}

fn classify_sqlite_error(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(sqlite_err, _) = &err {
        if matches!(sqlite_err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) {
            return StoreError::Retryable(err.to_string());
        }
    }
    StoreError::Sqlite(err)
}

#[async_trait]
impl StoreGateway for SqliteStoreGateway {
    async fn get_wallpaper(&self, id: &str) -> Result<Option<WallpaperRecord>, StoreError> {
        retry_with_backoff(
            || async {
                let conn = self.conn.clone();
                let id = id.to_string();
                tokio::task::spawn_blocking(move || {
                    let conn = conn.lock();
                    conn.query_row(
                        "SELECT * FROM wallpapers WHERE wallpaper_id = ?1",
                        params![id],
                        Self::row_to_record,
                    )
                    .optional()
                    .map_err(classify_sqlite_error)
                })
                .await
                .expect("blocking task panicked")
            },
            WRITE_RETRY_ATTEMPTS,
            WRITE_RETRY_INITIAL_DELAY,
            is_retryable,
        )
        .await
    }

    async fn upsert_new(&self, record: WallpaperRecord) -> Result<(), StoreError> {
        retry_with_backoff(
            || {
                let record = record.clone();
                async move {
                    let conn = self.conn.clone();
                    tokio::task::spawn_blocking(move || {
                        let conn = conn.lock();
                        let tags_json = serde_json::to_string(&record.tags).unwrap();
                        let result = conn.execute(
                            "INSERT INTO wallpapers (
                                wallpaper_id, category, search_term, wallpaper_url, image_url,
                                tags, purity, safe, status, sha256, tg_response, failure_reason, created_at
                            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
                            params![
                                record.wallpaper_id,
                                record.category,
                                record.search_term,
                                record.wallpaper_url,
                                record.image_url,
                                tags_json,
                                record.purity.as_db_str(),
                                record.safe as i64,
                                record.status.as_db_str(),
                                record.sha256,
                                record.tg_response.as_ref().map(|t| serde_json::to_string(t).unwrap()),
                                record.failure_reason,
                                record.created_at,
                            ],
                        );
                        match result {
                            Ok(_) => Ok(()),
                            Err(rusqlite::Error::SqliteFailure(e, _))
                                if e.code == ErrorCode::ConstraintViolation =>
                            {
                                Err(StoreError::AlreadyExists(record.wallpaper_id.clone()))
                            }
                            Err(e) => Err(classify_sqlite_error(e)),
                        }
                    })
                    .await
                    .expect("blocking task panicked")
                }
            },
            WRITE_RETRY_ATTEMPTS,
            WRITE_RETRY_INITIAL_DELAY,
            is_retryable,
        )
        .await
    }

    async fn query_pending(
        &self,
        category: &str,
        limit: usize,
    ) -> Result<Vec<WallpaperRecord>, StoreError> {
        retry_with_backoff(
            || async {
                let conn = self.conn.clone();
                let category = category.to_string();
                tokio::task::spawn_blocking(move || {
                    let conn = conn.lock();
                    let mut stmt = conn
                        .prepare(
                            "SELECT * FROM wallpapers WHERE category = ?1 AND status = 'link_added'
                             LIMIT ?2",
                        )
                        .map_err(classify_sqlite_error)?;
                    let rows = stmt
                        .query_map(params![category, limit as i64], Self::row_to_record)
                        .map_err(classify_sqlite_error)?;
                    rows.collect::<Result<Vec<_>, _>>().map_err(classify_sqlite_error)
                })
                .await
                .expect("blocking task panicked")
            },
            WRITE_RETRY_ATTEMPTS,
            WRITE_RETRY_INITIAL_DELAY,
            is_retryable,
        )
        .await
    }

    async fn update_status(&self, id: &str, update: StatusUpdate) -> Result<(), StoreError> {
        retry_with_backoff(
            || {
                let update = update.clone();
                async {
                    let conn = self.conn.clone();
                    let id = id.to_string();
                    tokio::task::spawn_blocking(move || {
                        let mut record = {
                            let conn = conn.lock();
                            conn.query_row(
                                "SELECT * FROM wallpapers WHERE wallpaper_id = ?1",
                                params![id],
                                Self::row_to_record,
                            )
                            .map_err(classify_sqlite_error)?
                        };
                        record.apply(update);
                        let conn = conn.lock();
                        conn.execute(
                            "UPDATE wallpapers SET status=?1, sha256=?2, tg_response=?3, failure_reason=?4
                             WHERE wallpaper_id=?5",
                            params![
                                record.status.as_db_str(),
                                record.sha256,
                                record.tg_response.as_ref().map(|t| serde_json::to_string(t).unwrap()),
                                record.failure_reason,
                                id,
                            ],
                        )
                        .map_err(classify_sqlite_error)?;
                        Ok(())
                    })
                    .await
                    .expect("blocking task panicked")
                }
            },
            WRITE_RETRY_ATTEMPTS,
            WRITE_RETRY_INITIAL_DELAY,
            is_retryable,
        )
        .await
    }

    async fn get_cursor(&self, key: &str) -> Result<Option<FetchCursor>, StoreError> {
        let conn = self.conn.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            conn.query_row(
                "SELECT round, target, skip, last_updated, exhausted_at FROM cursors WHERE key = ?1",
                params![key],
                |row| {
                    Ok(FetchCursor {
                        round: row.get(0)?,
                        target: row.get(1)?,
                        skip: row.get(2)?,
                        last_updated: row.get(3)?,
                        exhausted_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(classify_sqlite_error)
        })
        .await
        .expect("blocking task panicked")
    }

    async fn set_cursor(&self, key: &str, cursor: FetchCursor) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            conn.execute(
                "INSERT INTO cursors (key, round, target, skip, last_updated, exhausted_at)
                 VALUES (?1,?2,?3,?4,?5,?6)
                 ON CONFLICT(key) DO UPDATE SET
                    round=excluded.round, target=excluded.target, skip=excluded.skip,
                    last_updated=excluded.last_updated, exhausted_at=excluded.exhausted_at",
                params![
                    key,
                    cursor.round,
                    cursor.target,
                    cursor.skip,
                    cursor.last_updated,
                    cursor.exhausted_at,
                ],
            )
            .map_err(classify_sqlite_error)?;
            Ok(())
        })
        .await
        .expect("blocking task panicked")
    }

    async fn scan_metadata(&self) -> Result<Vec<MetadataRow>, StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let mut stmt = conn
                .prepare("SELECT wallpaper_id, category, search_term, created_at FROM wallpapers")
                .map_err(classify_sqlite_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(MetadataRow {
                        wallpaper_id: row.get(0)?,
                        category: row.get(1)?,
                        search_term: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })
                .map_err(classify_sqlite_error)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(classify_sqlite_error)
        })
        .await
        .expect("blocking task panicked")
    }

    async fn find_by_sha256(&self, sha256: &str) -> Result<Option<WallpaperRecord>, StoreError> {
        retry_with_backoff(
            || async {
                let conn = self.conn.clone();
                let sha256 = sha256.to_string();
                tokio::task::spawn_blocking(move || {
                    let conn = conn.lock();
                    conn.query_row(
                        "SELECT * FROM wallpapers WHERE sha256 = ?1 LIMIT 1",
                        params![sha256],
                        Self::row_to_record,
                    )
                    .optional()
                    .map_err(classify_sqlite_error)
                })
                .await
                .expect("blocking task panicked")
            },
            WRITE_RETRY_ATTEMPTS,
            READ_RETRY_INITIAL_DELAY,
            is_retryable,
        )
        .await
    }
}
