//! Client for the wallpaper search/detail API (Wallhaven-shaped).
//!
//! All calls are routed through a shared [`RateLimiter`] before the request
//! leaves the process, rather than a per-call decorator.

use serde::Deserialize;

use crate::error::SourceApiError;
use crate::rate_limiter::RateLimiter;
use crate::shutdown::ShutdownSignal;

const BASE_URL: &str = "https://wallhaven.cc/api/v1";

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub url: String,
    pub path: String,
    pub purity: String,
    #[serde(default)]
    pub tags: Vec<SearchTag>,
}

/// A tag as embedded directly in a search hit. Carries only `name`; richer
/// tag metadata (category, purity) is only on the detail endpoint.
#[derive(Debug, Deserialize)]
pub struct SearchTag {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct DetailEnvelope {
    data: DetailHit,
}

#[derive(Debug, Deserialize)]
struct DetailHit {
    #[serde(default)]
    tags: Vec<DetailTag>,
}

#[derive(Debug, Deserialize)]
struct DetailTag {
    name: String,
}

pub struct SourceClient {
    http: reqwest::Client,
    api_key: String,
    limiter: RateLimiter,
}

impl SourceClient {
    pub fn new(api_key: String, limiter: RateLimiter) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("reqwest client builder never fails with this config"),
            api_key,
            limiter,
        }
    }

    /// Searches one page of results for `term`, restricted to safe and
    /// sketchy purity, portrait ratio, sorted by view count. Returns an
    /// empty vec once the feed for this (term, page, skip) is exhausted.
    pub async fn search(
        &self,
        term: &str,
        page: u32,
        shutdown: &ShutdownSignal,
    ) -> Result<Vec<SearchHit>, SourceApiError> {
        self.limiter
            .acquire(shutdown)
            .await
            .map_err(|_| SourceApiError::MalformedResponse("shutdown requested".into()))?;
        let query: String = term.chars().filter(|c| *c != '#').collect();
        let response = self
            .http
            .get(format!("{BASE_URL}/search"))
            .query(&[
                ("q", query.as_str()),
                ("categories", "110"),
                ("purity", "110"),
                ("ratios", "portrait"),
                ("sorting", "views"),
                ("order", "desc"),
                ("page", &page.to_string()),
                ("apikey", &self.api_key),
            ])
            .send()
            .await?;
        if response.status().as_u16() == 401 {
            return Err(SourceApiError::Unauthorized);
        }
        let envelope: SearchEnvelope = response.error_for_status()?.json().await?;
        Ok(envelope.data)
    }

    /// Fetches the tag list for one wallpaper from the detail endpoint. Not
    /// called on the candidate hot path — search results already carry their
    /// own tags; this exists for callers that need the richer per-tag
    /// metadata the detail endpoint returns.
    #[allow(dead_code)]
    pub async fn fetch_tags(
        &self,
        wallpaper_id: &str,
        shutdown: &ShutdownSignal,
    ) -> Result<Vec<String>, SourceApiError> {
        self.limiter
            .acquire(shutdown)
            .await
            .map_err(|_| SourceApiError::MalformedResponse("shutdown requested".into()))?;
        let response = self
            .http
            .get(format!("{BASE_URL}/w/{wallpaper_id}"))
            .query(&[("apikey", &self.api_key)])
            .send()
            .await?;
        if response.status().as_u16() == 401 {
            return Err(SourceApiError::Unauthorized);
        }
        let envelope: DetailEnvelope = response.error_for_status()?.json().await?;
        Ok(envelope.data.tags.into_iter().map(|t| t.name).collect())
    }
}
