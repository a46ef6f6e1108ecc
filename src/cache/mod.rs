//! The two-tier on-disk dedup cache: [`hash_cache`] and [`metadata_cache`].
//!
//! Both are cost optimizations over the document store, not correctness
//! primitives — every miss falls back to the store, which remains the only
//! authority (Design Notes, "Two-tier cache").

pub mod hash_cache;
pub mod metadata_cache;

pub use hash_cache::HashCache;
pub use metadata_cache::MetadataCache;

/// Shared SQLite pragma setup: conservative, stability-over-throughput
/// configuration (small page cache, full sync, DELETE journal) rather than
/// the WAL/large-cache tuning a throughput-oriented store would use.
fn apply_stability_pragmas(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "DELETE")?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.pragma_update(None, "cache_size", -2000i64)?;
    Ok(())
}
