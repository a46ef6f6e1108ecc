//! Drives the paginated, stateful crawl across every configured category
//! and search term, respecting the write budget and rate limiter.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::cache::MetadataCache;
use crate::config::CategoryConfig;
use crate::error::SourceApiError;
use crate::model::{cursor_key, FetchCursor, WallpaperRecord};
use crate::shutdown::ShutdownSignal;
use crate::source_client::SourceClient;
use crate::store::StoreGateway;
use crate::write_budget::WriteBudget;

const DEFAULT_PAGE_SIZE: u32 = 24;
const OVERFETCH_FACTOR: u32 = 2;
const BUDGET_PAUSED_SLEEP: Duration = Duration::from_secs(3600);
const CANDIDATE_RETRY_PAUSE: Duration = Duration::from_secs(30);
const SHELL_UNSAFE_CHARS: &[char] = &['|', '&', ';', '<', '>', '$', '`', '"', '\\'];
const EXCLUSIONS: &str = "-girl -woman -nsfw";

/// Strips shell-unsafe characters and `#`, then collapses whitespace. The
/// resulting query never needs additional escaping downstream.
fn sanitize_term(term: &str) -> String {
    let stripped: String = term
        .chars()
        .filter(|c| *c != '#' && !SHELL_UNSAFE_CHARS.contains(c))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn effective_query(term: &str) -> String {
    format!("{} {}", sanitize_term(term), EXCLUSIONS)
}

pub struct Fetcher {
    source: SourceClient,
    store: Arc<dyn StoreGateway>,
    meta_cache: Arc<MetadataCache>,
    write_budget: Arc<WriteBudget>,
    categories: Vec<CategoryConfig>,
    shutdown: ShutdownSignal,
}

impl Fetcher {
    pub fn new(
        source: SourceClient,
        store: Arc<dyn StoreGateway>,
        meta_cache: Arc<MetadataCache>,
        write_budget: Arc<WriteBudget>,
        categories: Vec<CategoryConfig>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            source,
            store,
            meta_cache,
            write_budget,
            categories,
            shutdown,
        }
    }

    /// Runs forever, cycling through every category/term pair, until
    /// shutdown is requested.
    pub async fn run(&self) {
        while !self.shutdown.requested() {
            for category in &self.categories {
                if self.shutdown.requested() {
                    return;
                }
                for term in &category.terms {
                    if self.shutdown.requested() {
                        return;
                    }
                    if !self.write_budget.allow().await.unwrap_or(false) {
                        info!("write budget exhausted, pausing fetcher for an hour");
                        if self.shutdown.sleep(BUDGET_PAUSED_SLEEP).await.is_err() {
                            return;
                        }
                        continue;
                    }
                    self.run_term(&category.name, term).await;
                }
            }
        }
    }

    /// Runs one crawl round for a single (category, term) pair. Errors are
    /// logged and swallowed here — a failure in one term must never abort
    /// the outer cycle.
    async fn run_term(&self, category: &str, term: &str) {
        let key = cursor_key(category, term);
        let cursor = match self.store.get_cursor(&key).await {
            Ok(Some(c)) => c,
            Ok(None) => FetchCursor::initial(now_secs()),
            Err(e) => {
                error!(error = %e, category, term, "failed to load fetch cursor");
                return;
            }
        };

        let start_page = (cursor.skip / DEFAULT_PAGE_SIZE) + 1;
        let query = effective_query(term);
        let mut page = start_page;
        let mut added: u32 = 0;
        let mut processed: u32 = 0;
        let mut exhausted = false;

        loop {
            if self.shutdown.requested() {
                return;
            }
            if added >= cursor.target {
                break;
            }
            if processed >= OVERFETCH_FACTOR * cursor.target {
                break;
            }
            if !self.write_budget.allow().await.unwrap_or(false) {
                break;
            }

            let hits = match self.source.search(&query, page, &self.shutdown).await {
                Ok(hits) => hits,
                Err(SourceApiError::Unauthorized) => {
                    error!(category, term, "invalid source API key, aborting term");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, category, term, "transient search failure, aborting term");
                    return;
                }
            };

            if hits.is_empty() {
                exhausted = true;
                break;
            }

            for hit in hits {
                if hit.id.is_empty() || hit.url.is_empty() || hit.path.is_empty() {
                    continue;
                }
                processed += 1;
                if let Some(outcome) = self.process_candidate(category, term, &hit).await {
                    if outcome {
                        added += 1;
                        self.write_budget.commit().await.ok();
                    }
                } else {
                    // candidate errored after retries; small backoff before continuing
                    if self.shutdown.sleep(CANDIDATE_RETRY_PAUSE).await.is_err() {
                        return;
                    }
                }
                if added >= cursor.target || processed >= OVERFETCH_FACTOR * cursor.target {
                    break;
                }
            }

            page += 1;
        }

        let now = now_secs();
        let next = if added >= cursor.target {
            cursor.advanced(now)
        } else if exhausted {
            cursor.exhausted(now)
        } else {
            cursor
        };
        if next != cursor {
            if let Err(e) = self.store.set_cursor(&key, next).await {
                error!(error = %e, category, term, "failed to persist fetch cursor");
            }
        }
    }

    /// Processes one search hit. Returns `Some(true)` if a new record was
    /// added, `Some(false)` if it was a known duplicate, `None` if the
    /// candidate failed after the store's own retry schedule.
    async fn process_candidate(
        &self,
        category: &str,
        term: &str,
        hit: &crate::source_client::SearchHit,
    ) -> Option<bool> {
        if self.meta_cache.contains(&hit.id).await.unwrap_or(false) {
            return Some(false);
        }
        match self.store.get_wallpaper(&hit.id).await {
            Ok(Some(_)) => {
                self.meta_cache
                    .insert(&hit.id, category, term, now_secs())
                    .await
                    .ok();
                Some(false)
            }
            Ok(None) => {
                let tags = hit.tags.iter().map(|t| t.name.clone()).collect();
                let purity = crate::model::Purity::from_api_str(&hit.purity);
                let record = WallpaperRecord::new_link_added(
                    hit.id.clone(),
                    category.to_string(),
                    term.to_string(),
                    hit.url.clone(),
                    hit.path.clone(),
                    tags,
                    purity,
                    now_secs(),
                );
                match self.store.upsert_new(record).await {
                    Ok(()) => {
                        self.meta_cache
                            .insert(&hit.id, category, term, now_secs())
                            .await
                            .ok();
                        Some(true)
                    }
                    Err(crate::error::StoreError::AlreadyExists(_)) => {
                        self.meta_cache
                            .insert(&hit.id, category, term, now_secs())
                            .await
                            .ok();
                        Some(false)
                    }
                    Err(e) => {
                        error!(error = %e, id = %hit.id, "failed to upsert new candidate");
                        None
                    }
                }
            }
            Err(e) => {
                error!(error = %e, id = %hit.id, "failed to look up candidate in store");
                None
            }
        }
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}
