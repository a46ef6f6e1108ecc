//! Typed configuration loaded from `.env` plus the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

const MIN_INTERVAL: Duration = Duration::from_secs(60);

/// One `CATEGORY_n | group_id | interval_seconds | term1, term2, ...` line.
#[derive(Debug, Clone)]
pub struct CategoryConfig {
    pub name: String,
    pub group_id: i64,
    pub interval: Duration,
    pub terms: Vec<String>,
}

/// Top-level, validated configuration for one process run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub firebase_credentials: PathBuf,
    pub telegram_bot_token: String,
    pub wallhaven_api_key: String,
    pub categories: Vec<CategoryConfig>,
    pub cache_dir: PathBuf,
    pub max_rpm: u32,
    pub write_budget_max_adds: u32,
    pub write_budget_period: Duration,
    pub max_hash_rows: usize,
    pub max_meta_rows: usize,
}

impl AppConfig {
    /// Loads `.env` (if present) then reads and validates the environment.
    /// Fatal on any [`ConfigError`] — callers should exit non-zero.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_env(|key| std::env::var(key).ok())
    }

    /// Environment-reading indirection so tests can supply a fixture map
    /// without mutating the real process environment.
    pub fn from_env(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let firebase_credentials = get("FIREBASE_CREDENTIALS")
            .ok_or(ConfigError::MissingVar("FIREBASE_CREDENTIALS"))?;
        let firebase_credentials = PathBuf::from(firebase_credentials);
        if !firebase_credentials.is_file() {
            return Err(ConfigError::BadPath(
                "FIREBASE_CREDENTIALS",
                firebase_credentials.display().to_string(),
            ));
        }

        let telegram_bot_token =
            get("TELEGRAM_BOT_TOKEN").ok_or(ConfigError::MissingVar("TELEGRAM_BOT_TOKEN"))?;
        if telegram_bot_token.len() < 20 {
            return Err(ConfigError::TooShort("TELEGRAM_BOT_TOKEN", 20));
        }

        let wallhaven_api_key =
            get("WALLHAVEN_API_KEY").ok_or(ConfigError::MissingVar("WALLHAVEN_API_KEY"))?;
        if wallhaven_api_key.is_empty() {
            return Err(ConfigError::MissingVar("WALLHAVEN_API_KEY"));
        }

        let categories = parse_categories(&get)?;

        let cache_dir = get("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./wall-cache"));

        let max_rpm = parse_u32_or(&get, "MAX_REQUESTS_PER_MINUTE", 40);
        let write_budget_max_adds = parse_u32_or(&get, "WRITE_BUDGET_MAX_ADDS", 2000);
        let write_budget_period_hours = parse_u32_or(&get, "WRITE_BUDGET_PERIOD_HOURS", 28);
        let max_hash_rows = parse_u32_or(&get, "MAX_HASH_ROWS", 1_000_000) as usize;
        let max_meta_rows = parse_u32_or(&get, "MAX_META_ROWS", 500_000) as usize;

        Ok(Self {
            firebase_credentials,
            telegram_bot_token,
            wallhaven_api_key,
            categories,
            cache_dir,
            max_rpm,
            write_budget_max_adds,
            write_budget_period: Duration::from_secs(write_budget_period_hours as u64 * 3600),
            max_hash_rows,
            max_meta_rows,
        })
    }
}

fn parse_u32_or(get: &impl Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

/// Parses the `CATEGORY_1`, `CATEGORY_2`, ... sequence. Stops at the first
/// missing index — there is no requirement for the sequence to be dense
/// beyond that point, but gaps below the first missing index are an error
/// since they almost always indicate a typo.
fn parse_categories(
    get: &impl Fn(&str) -> Option<String>,
) -> Result<Vec<CategoryConfig>, ConfigError> {
    let mut categories = Vec::new();
    let mut index = 1usize;
    loop {
        let key = format!("CATEGORY_{index}");
        let Some(line) = get(&key) else {
            break;
        };
        categories.push(parse_category_line(index, &line)?);
        index += 1;
    }
    if categories.is_empty() {
        return Err(ConfigError::NoCategories);
    }
    Ok(categories)
}

fn parse_category_line(line_num: usize, line: &str) -> Result<CategoryConfig, ConfigError> {
    let parts: Vec<&str> = line.split('|').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(ConfigError::BadCategoryLine {
            line: line_num,
            reason: "expected 4 pipe-separated fields".into(),
        });
    }

    let name = parts[0].to_string();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::BadCategoryLine {
            line: line_num,
            reason: format!("invalid category name {:?}", name),
        });
    }

    let group_id: i64 = parts[1].parse().map_err(|_| ConfigError::BadCategoryLine {
        line: line_num,
        reason: format!("group_id {:?} is not an integer", parts[1]),
    })?;

    let interval_secs: u64 = parts[2].parse().map_err(|_| ConfigError::BadCategoryLine {
        line: line_num,
        reason: format!("interval_seconds {:?} is not an integer", parts[2]),
    })?;
    let mut interval = Duration::from_secs(interval_secs);
    if interval < MIN_INTERVAL {
        tracing::warn!(
            category = %name,
            requested_secs = interval_secs,
            "interval below 60s minimum, clamping"
        );
        interval = MIN_INTERVAL;
    }

    let terms: Vec<String> = parts[3]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if terms.is_empty() {
        return Err(ConfigError::BadCategoryLine {
            line: line_num,
            reason: "no search terms".into(),
        });
    }

    Ok(CategoryConfig {
        name,
        group_id,
        interval,
        terms,
    })
}
