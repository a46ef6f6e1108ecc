//! Data models shared by the Fetcher and Pipeline.
//!
//! # Key Types
//!
//! - [`WallpaperRecord`] - the persisted entity tracked from discovery to terminal state
//! - [`StatusUpdate`] - a tagged update applied to a record by the Pipeline
//! - [`FetchCursor`] - per-(category, term) crawl progress
//!
//! # Examples
//!
//! ```
//! use wallbot::model::{Purity, WallpaperRecord, WallpaperStatus};
//!
//! let record = WallpaperRecord::new_link_added(
//!     "abc123".into(),
//!     "nature".into(),
//!     "tree".into(),
//!     "https://example.invalid/w/abc123".into(),
//!     "https://example.invalid/full/abc123.jpg".into(),
//!     vec!["forest".into()],
//!     Purity::Safe,
//!     1_700_000_000,
//! );
//! assert_eq!(record.status, WallpaperStatus::LinkAdded);
//! assert!(record.safe);
//! ```

use serde::{Deserialize, Serialize};

/// Purity label assigned by the source service. `Explicit` is never fetched
/// by this bot (the search filter excludes it) and has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Purity {
    Safe,
    Sketchy,
}

impl Purity {
    /// Parses the source API's purity string. Anything other than `"safe"`
    /// is treated as sketchy, matching the search filter's guarantee that
    /// explicit content is never returned.
    pub fn from_api_str(s: &str) -> Self {
        if s == "safe" {
            Purity::Safe
        } else {
            Purity::Sketchy
        }
    }

    pub fn as_db_str(self) -> &'static str {
        match self {
            Purity::Safe => "safe",
            Purity::Sketchy => "sketchy",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "safe" => Purity::Safe,
            _ => Purity::Sketchy,
        }
    }
}

/// Lifecycle state of a [`WallpaperRecord`]. `LinkAdded` is the only initial
/// state; `Posted`, `Skipped`, and `Failed` are terminal and the transition
/// into them is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallpaperStatus {
    LinkAdded,
    Posted,
    Skipped,
    Failed,
}

impl WallpaperStatus {
    pub fn as_db_str(self) -> &'static str {
        match self {
            WallpaperStatus::LinkAdded => "link_added",
            WallpaperStatus::Posted => "posted",
            WallpaperStatus::Skipped => "skipped",
            WallpaperStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "link_added" => Some(WallpaperStatus::LinkAdded),
            "posted" => Some(WallpaperStatus::Posted),
            "skipped" => Some(WallpaperStatus::Skipped),
            "failed" => Some(WallpaperStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, WallpaperStatus::LinkAdded)
    }
}

/// Outcome of a single chat-platform send, recorded as part of the upload
/// response blob regardless of whether the overall item succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub message_id: Option<i64>,
    pub date: Option<i64>,
    pub success: bool,
}

/// The full upload response blob persisted on a record, covering both the
/// preview album send and the individual HD document send.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TgResponse {
    pub group_id: i64,
    pub album_size: usize,
    pub upload_time: i64,
    pub preview: Option<SendOutcome>,
    pub hd: Option<SendOutcome>,
}

/// A tagged update applied to a [`WallpaperRecord`] by the Pipeline. Using a
/// closed union instead of a free-form patch map means a malformed update is
/// rejected when it is constructed, not when it is written.
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    Posted {
        sha256: String,
        tg: TgResponse,
    },
    Skipped {
        matched_wallpaper_id: String,
        tg: Option<TgResponse>,
    },
    Failed {
        sha256: Option<String>,
        reason: String,
        tg: Option<TgResponse>,
    },
}

impl StatusUpdate {
    pub fn status(&self) -> WallpaperStatus {
        match self {
            StatusUpdate::Posted { .. } => WallpaperStatus::Posted,
            StatusUpdate::Skipped { .. } => WallpaperStatus::Skipped,
            StatusUpdate::Failed { .. } => WallpaperStatus::Failed,
        }
    }
}

/// The primary persisted entity: one candidate image discovered by the
/// Fetcher and, eventually, moved to a terminal state by the Pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallpaperRecord {
    pub wallpaper_id: String,
    pub category: String,
    pub search_term: String,
    pub wallpaper_url: String,
    pub image_url: String,
    pub tags: Vec<String>,
    pub purity: Purity,
    pub safe: bool,
    pub status: WallpaperStatus,
    pub sha256: Option<String>,
    pub tg_response: Option<TgResponse>,
    pub failure_reason: Option<String>,
    pub created_at: i64,
}

impl WallpaperRecord {
    /// Builds a freshly-discovered record in its initial `link_added` state.
    pub fn new_link_added(
        wallpaper_id: String,
        category: String,
        search_term: String,
        wallpaper_url: String,
        image_url: String,
        tags: Vec<String>,
        purity: Purity,
        created_at: i64,
    ) -> Self {
        let safe = purity == Purity::Safe;
        Self {
            wallpaper_id,
            category,
            search_term,
            wallpaper_url,
            image_url,
            tags,
            purity,
            safe,
            status: WallpaperStatus::LinkAdded,
            sha256: None,
            tg_response: None,
            failure_reason: None,
            created_at,
        }
    }

    /// Applies a [`StatusUpdate`], enforcing the `posted ⇒ sha256 != null`
    /// invariant at the one place updates are constructed from.
    pub fn apply(&mut self, update: StatusUpdate) {
        match update {
            StatusUpdate::Posted { sha256, tg } => {
                self.status = WallpaperStatus::Posted;
                self.sha256 = Some(sha256);
                self.tg_response = Some(tg);
                self.failure_reason = None;
            }
            StatusUpdate::Skipped {
                matched_wallpaper_id,
                tg,
            } => {
                self.status = WallpaperStatus::Skipped;
                self.failure_reason = Some(format!("SHA256_match_cached:{matched_wallpaper_id}"));
                if tg.is_some() {
                    self.tg_response = tg;
                }
            }
            StatusUpdate::Failed {
                sha256,
                reason,
                tg,
            } => {
                self.status = WallpaperStatus::Failed;
                if sha256.is_some() {
                    self.sha256 = sha256;
                }
                self.failure_reason = Some(reason);
                if tg.is_some() {
                    self.tg_response = tg;
                }
            }
        }
    }
}

/// Per-(category, term) crawl progress, persisted so a restart resumes
/// rather than re-walking pages that are already known to be duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchCursor {
    pub round: u32,
    pub target: u32,
    pub skip: u32,
    pub last_updated: i64,
    pub exhausted_at: Option<i64>,
}

impl FetchCursor {
    /// The default cursor for a (category, term) pair seen for the first time.
    pub fn initial(now: i64) -> Self {
        Self {
            round: 1,
            target: 100,
            skip: 0,
            last_updated: now,
            exhausted_at: None,
        }
    }

    /// Computes the next round's cursor without mutating `self`. Skip only
    /// kicks in once the cumulative target reaches 800.
    pub fn advanced(&self, now: i64) -> Self {
        let next_round = self.round + 1;
        let next_target = next_round * 100;
        let next_skip = if next_target >= 800 {
            next_target - 500
        } else {
            0
        };
        Self {
            round: next_round,
            target: next_target,
            skip: next_skip,
            last_updated: now,
            exhausted_at: None,
        }
    }

    /// Marks the feed exhausted for this round without advancing it — the
    /// same round is retried on the next pass.
    pub fn exhausted(&self, now: i64) -> Self {
        Self {
            exhausted_at: Some(now),
            last_updated: now,
            ..*self
        }
    }
}

/// Keys a [`FetchCursor`] by its (category, search-term) pair in the store.
pub fn cursor_key(category: &str, term: &str) -> String {
    format!("{category}||{term}")
}
