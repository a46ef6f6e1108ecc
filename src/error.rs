//! Error taxonomy for the wallpaper bot engine.
//!
//! Each layer gets its own `thiserror` enum rather than a single catch-all
//! type, so callers can match on exactly the failures relevant to them.

use thiserror::Error;

/// Configuration loading and validation failures. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("{0} must be at least {1} characters")]
    TooShort(&'static str, usize),
    #[error("malformed category line {line}: {reason}")]
    BadCategoryLine { line: usize, reason: String },
    #[error("no category configuration found")]
    NoCategories,
    #[error("invalid path for {0}: {1}")]
    BadPath(&'static str, String),
}

/// Failures from the on-disk dedup caches (HashCache / MetadataCache).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cache store corrupted: {0}")]
    Corruption(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to the document store (wallpapers + cursors).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("wallpaper {0} already exists")]
    AlreadyExists(String),
    #[error("quota exceeded")]
    QuotaExceeded,
    #[error("transient store error: {0}")]
    Retryable(String),
}

/// Failures from the third-party search/detail API.
#[derive(Debug, Error)]
pub enum SourceApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid api key (401)")]
    Unauthorized,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Failures from the chat-platform send APIs.
#[derive(Debug, Error)]
pub enum ChatApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("chat platform rejected request: {0}")]
    Rejected(String),
}

/// Cooperative shutdown signal observed at a suspension point. Not an error
/// in the usual sense — callers treat it as "stop what you're doing".
#[derive(Debug, Error)]
#[error("shutdown requested")]
pub struct ShutdownRequested;
