//! Engine for a long-running wallpaper discovery and posting bot: a
//! rate-limited crawl feeding a document store, and a per-category posting
//! pipeline that guarantees exact-content dedup before every upload.

pub mod cache;
pub mod chat_client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod pipeline;
pub mod rate_limiter;
pub mod retry;
pub mod scheduler;
pub mod shutdown;
pub mod source_client;
pub mod store;
pub mod telemetry;
pub mod write_budget;
