//! Global, rolling-window write governor shared by every Fetcher round.
//!
//! The Pipeline never consults this — posting continues while fetching is
//! paused.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::error::CacheError;

/// A point-in-time view of the budget, useful for logging/metrics.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub period_start: i64,
    pub added: u32,
    pub max_adds: u32,
}

pub struct WriteBudget {
    conn: Arc<Mutex<Connection>>,
    max_adds: u32,
    period_secs: i64,
}

impl WriteBudget {
    pub fn open(path: impl AsRef<Path>, max_adds: u32, period: Duration) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "DELETE")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS write_budget (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                period_start INTEGER NOT NULL,
                added INTEGER NOT NULL
            )",
            [],
        )?;
        let now = now_secs();
        conn.execute(
            "INSERT OR IGNORE INTO write_budget (id, period_start, added) VALUES (0, ?1, 0)",
            params![now],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_adds,
            period_secs: period.as_secs() as i64,
        })
    }

    /// Pure check: true if another insert would stay within budget.
    pub async fn allow(&self) -> Result<bool, CacheError> {
        let conn = self.conn.clone();
        let max_adds = self.max_adds;
        let period_secs = self.period_secs;
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            roll_if_expired(&conn, period_secs)?;
            let added: i64 =
                conn.query_row("SELECT added FROM write_budget WHERE id = 0", [], |r| r.get(0))?;
            Ok(added < max_adds as i64)
        })
        .await
        .expect("blocking task panicked")
    }

    /// Records one new insert against the budget.
    pub async fn commit(&self) -> Result<(), CacheError> {
        let conn = self.conn.clone();
        let period_secs = self.period_secs;
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            roll_if_expired(&conn, period_secs)?;
            conn.execute("UPDATE write_budget SET added = added + 1 WHERE id = 0", [])?;
            Ok(())
        })
        .await
        .expect("blocking task panicked")
    }

    pub async fn snapshot(&self) -> Result<Snapshot, CacheError> {
        let conn = self.conn.clone();
        let max_adds = self.max_adds;
        let period_secs = self.period_secs;
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            roll_if_expired(&conn, period_secs)?;
            let (period_start, added): (i64, i64) = conn.query_row(
                "SELECT period_start, added FROM write_budget WHERE id = 0",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            Ok(Snapshot {
                period_start,
                added: added as u32,
                max_adds,
            })
        })
        .await
        .expect("blocking task panicked")
    }
}

/// Resets period_start and added atomically once the rolling window has
/// elapsed. Always run first, inside the same lock as the counter change.
fn roll_if_expired(conn: &Connection, period_secs: i64) -> Result<(), CacheError> {
    let now = now_secs();
    let period_start: i64 =
        conn.query_row("SELECT period_start FROM write_budget WHERE id = 0", [], |r| {
            r.get(0)
        })?;
    if now - period_start >= period_secs {
        conn.execute(
            "UPDATE write_budget SET period_start = ?1, added = 0 WHERE id = 0",
            params![now],
        )?;
    }
    Ok(())
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
    async fn allows_until_max_adds_reached() {
        let dir = tempfile::tempdir().unwrap();
        let budget = WriteBudget::open(dir.path().join("budget.db"), 2, Duration::from_secs(3600))
            .unwrap();
        assert!(budget.allow().await.unwrap());
        budget.commit().await.unwrap();
        assert!(budget.allow().await.unwrap());
        budget.commit().await.unwrap();
        assert!(!budget.allow().await.unwrap());
    }

    #[tokio::test]
    async fn snapshot_reports_current_counters() {
        let dir = tempfile::tempdir().unwrap();
        let budget = WriteBudget::open(dir.path().join("budget.db"), 5, Duration::from_secs(3600))
            .unwrap();
        budget.commit().await.unwrap();
        budget.commit().await.unwrap();
        let snap = budget.snapshot().await.unwrap();
        assert_eq!(snap.added, 2);
        assert_eq!(snap.max_adds, 5);
    }

    #[tokio::test]
    async fn resets_after_period_expires() {
        let dir = tempfile::tempdir().unwrap();
        let budget =
            WriteBudget::open(dir.path().join("budget.db"), 2, Duration::from_secs(1)).unwrap();
        budget.commit().await.unwrap();
        budget.commit().await.unwrap();
        assert!(!budget.allow().await.unwrap());
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(budget.allow().await.unwrap());
    }
}
