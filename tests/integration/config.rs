//! Multi-category and default-value scenarios beyond the single-line unit
//! tests colocated with the parser.

use std::collections::HashMap;
use std::time::Duration;

use wallbot::config::AppConfig;
use wallbot::error::ConfigError;

fn env_map(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| map.get(key).cloned()
}

/// Writes a throwaway credentials file and returns its path as a string,
/// since `FIREBASE_CREDENTIALS` must name a file that actually exists.
fn fake_credentials_path(dir: &tempfile::TempDir) -> String {
    let path = dir.path().join("creds.json");
    std::fs::write(&path, "{}").unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn parses_multiple_categories_with_independent_schedules() {
    let dir = tempfile::tempdir().unwrap();
    let creds = fake_credentials_path(&dir);
    let get = env_map(&[
        ("FIREBASE_CREDENTIALS", &creds),
        ("TELEGRAM_BOT_TOKEN", "0123456789012345678901"),
        ("WALLHAVEN_API_KEY", "abc"),
        ("CATEGORY_1", "nature | -100 | 900 | tree, water, sunset"),
        ("CATEGORY_2", "vehicle | -200 | 1800 | car, motorcycle"),
        ("CATEGORY_3", "anime | -300 | 3600 | landscape"),
    ]);

    let config = AppConfig::from_env(get).unwrap();
    assert_eq!(config.categories.len(), 3);
    assert_eq!(config.categories[0].name, "nature");
    assert_eq!(config.categories[0].interval, Duration::from_secs(900));
    assert_eq!(config.categories[1].group_id, -200);
    assert_eq!(config.categories[2].terms, vec!["landscape"]);
}

#[test]
fn stops_at_the_first_missing_index_even_if_a_later_one_is_present() {
    let dir = tempfile::tempdir().unwrap();
    let creds = fake_credentials_path(&dir);
    let get = env_map(&[
        ("FIREBASE_CREDENTIALS", &creds),
        ("TELEGRAM_BOT_TOKEN", "0123456789012345678901"),
        ("WALLHAVEN_API_KEY", "abc"),
        ("CATEGORY_1", "nature | -100 | 900 | tree"),
        ("CATEGORY_3", "anime | -300 | 3600 | landscape"),
    ]);

    let config = AppConfig::from_env(get).unwrap();
    assert_eq!(config.categories.len(), 1);
    assert_eq!(config.categories[0].name, "nature");
}

#[test]
fn applies_documented_defaults_when_optional_vars_are_absent() {
    let dir = tempfile::tempdir().unwrap();
    let creds = fake_credentials_path(&dir);
    let get = env_map(&[
        ("FIREBASE_CREDENTIALS", &creds),
        ("TELEGRAM_BOT_TOKEN", "0123456789012345678901"),
        ("WALLHAVEN_API_KEY", "abc"),
        ("CATEGORY_1", "nature | -100 | 900 | tree"),
    ]);

    let config = AppConfig::from_env(get).unwrap();
    assert_eq!(config.cache_dir, std::path::PathBuf::from("./wall-cache"));
    assert_eq!(config.max_rpm, 40);
    assert_eq!(config.write_budget_max_adds, 2000);
    assert_eq!(config.write_budget_period, Duration::from_secs(28 * 3600));
    assert_eq!(config.max_hash_rows, 1_000_000);
    assert_eq!(config.max_meta_rows, 500_000);
}

#[test]
fn overrides_every_optional_var_when_present() {
    let dir = tempfile::tempdir().unwrap();
    let creds = fake_credentials_path(&dir);
    let get = env_map(&[
        ("FIREBASE_CREDENTIALS", &creds),
        ("TELEGRAM_BOT_TOKEN", "0123456789012345678901"),
        ("WALLHAVEN_API_KEY", "abc"),
        ("CATEGORY_1", "nature | -100 | 900 | tree"),
        ("CACHE_DIR", "/var/lib/wallbot"),
        ("MAX_REQUESTS_PER_MINUTE", "20"),
        ("WRITE_BUDGET_MAX_ADDS", "500"),
        ("WRITE_BUDGET_PERIOD_HOURS", "12"),
        ("MAX_HASH_ROWS", "100"),
        ("MAX_META_ROWS", "50"),
    ]);

    let config = AppConfig::from_env(get).unwrap();
    assert_eq!(config.cache_dir, std::path::PathBuf::from("/var/lib/wallbot"));
    assert_eq!(config.max_rpm, 20);
    assert_eq!(config.write_budget_max_adds, 500);
    assert_eq!(config.write_budget_period, Duration::from_secs(12 * 3600));
    assert_eq!(config.max_hash_rows, 100);
    assert_eq!(config.max_meta_rows, 50);
}

#[test]
fn rejects_a_category_line_with_a_non_numeric_group_id() {
    let dir = tempfile::tempdir().unwrap();
    let creds = fake_credentials_path(&dir);
    let get = env_map(&[
        ("FIREBASE_CREDENTIALS", &creds),
        ("TELEGRAM_BOT_TOKEN", "0123456789012345678901"),
        ("WALLHAVEN_API_KEY", "abc"),
        ("CATEGORY_1", "nature | not-a-number | 900 | tree"),
    ]);

    assert!(matches!(
        AppConfig::from_env(get),
        Err(ConfigError::BadCategoryLine { line: 1, .. })
    ));
}

#[test]
fn rejects_a_category_name_with_invalid_characters() {
    let dir = tempfile::tempdir().unwrap();
    let creds = fake_credentials_path(&dir);
    let get = env_map(&[
        ("FIREBASE_CREDENTIALS", &creds),
        ("TELEGRAM_BOT_TOKEN", "0123456789012345678901"),
        ("WALLHAVEN_API_KEY", "abc"),
        ("CATEGORY_1", "na ture! | -100 | 900 | tree"),
    ]);

    assert!(matches!(
        AppConfig::from_env(get),
        Err(ConfigError::BadCategoryLine { line: 1, .. })
    ));
}

#[test]
fn rejects_a_credentials_path_that_does_not_exist() {
    let get = env_map(&[
        ("FIREBASE_CREDENTIALS", "/nonexistent/path/creds.json"),
        ("TELEGRAM_BOT_TOKEN", "0123456789012345678901"),
        ("WALLHAVEN_API_KEY", "abc"),
        ("CATEGORY_1", "nature | -100 | 900 | tree"),
    ]);

    assert!(matches!(
        AppConfig::from_env(get),
        Err(ConfigError::BadPath("FIREBASE_CREDENTIALS", _))
    ));
}
