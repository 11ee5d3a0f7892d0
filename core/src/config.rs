//! Environment-driven settings.
//!
//! Every entry point runs without flags. Values come from the environment
//! (optionally seeded from a `.env` file) and fall back to the constants in
//! [`crate::constants`].

use crate::constants::{
    DEFAULT_ITERATIONS, DEFAULT_PG_BATCH_SIZE, DEFAULT_SEARCH_BATCH_SIZE, DEFAULT_TOTAL_RECORDS,
    PG_DEFAULT_URL, SEARCH_DEFAULT_URL,
};
use log::{warn, LevelFilter};
use std::env;
use std::str::FromStr;

/// Loads `.env` from the working directory (or a parent) if one exists.
pub fn load_dotenv() {
    // A missing file is the normal case.
    let _ = dotenvy::dotenv();
}

pub fn parse_log_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

pub fn resolve_log_level() -> LevelFilter {
    env::var("HASHBENCH_LOG_LEVEL")
        .ok()
        .as_deref()
        .and_then(parse_log_level)
        .unwrap_or(LevelFilter::Info)
}

/// `None`, empty or unset disables the log file.
pub fn parse_log_file(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn resolve_log_file() -> Option<String> {
    parse_log_file(env::var("HASHBENCH_LOG_FILE").ok().as_deref())
}

pub fn resolve_database_url() -> String {
    non_empty_var("DATABASE_URL").unwrap_or_else(|| PG_DEFAULT_URL.to_string())
}

pub fn resolve_search_url() -> String {
    non_empty_var("OPENSEARCH_URL")
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|| SEARCH_DEFAULT_URL.to_string())
}

pub fn resolve_total_records() -> u64 {
    positive_var("HASHBENCH_TOTAL_RECORDS", DEFAULT_TOTAL_RECORDS)
}

pub fn resolve_pg_batch_size() -> u64 {
    positive_var("HASHBENCH_PG_BATCH_SIZE", DEFAULT_PG_BATCH_SIZE)
}

pub fn resolve_search_batch_size() -> u64 {
    positive_var("HASHBENCH_SEARCH_BATCH_SIZE", DEFAULT_SEARCH_BATCH_SIZE)
}

pub fn resolve_iterations() -> u32 {
    positive_var("HASHBENCH_ITERATIONS", DEFAULT_ITERATIONS)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn positive_var<T>(name: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy + std::fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => parse_positive(&raw).unwrap_or_else(|| {
            warn!("Ignoring {name}={raw}: expected a positive integer, using {default}");
            default
        }),
        None => default,
    }
}

/// Parses a strictly positive integer; zero and garbage are rejected.
pub fn parse_positive<T>(raw: &str) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    raw.trim()
        .replace('_', "")
        .parse::<T>()
        .ok()
        .filter(|value| *value > T::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_names_are_case_insensitive() {
        assert_eq!(parse_log_level("DEBUG"), Some(LevelFilter::Debug));
        assert_eq!(parse_log_level(" warning "), Some(LevelFilter::Warn));
        assert_eq!(parse_log_level("verbose"), None);
    }

    #[test]
    fn log_file_can_be_disabled() {
        assert_eq!(parse_log_file(None), None);
        assert_eq!(parse_log_file(Some("")), None);
        assert_eq!(parse_log_file(Some("NONE")), None);
        assert_eq!(
            parse_log_file(Some(" seed.log ")),
            Some("seed.log".to_string())
        );
    }

    #[test]
    fn positive_integers_accept_separators() {
        assert_eq!(parse_positive::<u64>("10_000_000"), Some(10_000_000));
        assert_eq!(parse_positive::<u32>("25"), Some(25));
        assert_eq!(parse_positive::<u32>("0"), None);
        assert_eq!(parse_positive::<u32>("-3"), None);
        assert_eq!(parse_positive::<u64>("lots"), None);
    }
}
