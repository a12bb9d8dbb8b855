//! Runtime settings loaded from the environment

use std::env;
use std::time::Duration;

fn csv_env(name: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Pipeline configuration
///
/// Every field has a working default so `Settings::from_env()` never
/// fails; an empty GitHub token simply disables the crawler.
#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite database URL (e.g. `sqlite://proxies.db`)
    pub database_url: String,
    /// GitHub API token; empty disables the GitHub collector
    pub github_token: String,
    /// Search keywords for code and repository search
    pub github_queries: Vec<String>,
    /// Pages to walk per code-search query
    pub github_code_pages: u32,
    /// Pages to walk per repository-search query
    pub github_repo_pages: u32,
    /// Results per search page (clamped to 1..=100 by the collector)
    pub github_per_page: u32,
    /// Skip tree blobs larger than this many bytes
    pub github_max_blob_bytes: u64,
    /// Bulk URL sources fetched every cycle
    pub source_urls: Vec<String>,
    /// Per-candidate validation timeout
    pub check_timeout: Duration,
    /// Requested validation concurrency
    pub max_concurrent_checks: usize,
    /// Upper bound on candidates validated per cycle
    pub max_candidates_per_cycle: usize,
    /// Keep only these countries when non-empty (ISO alpha-2, uppercase)
    pub country_whitelist: Vec<String>,
    /// Always drop these countries (ISO alpha-2, uppercase)
    pub country_blacklist: Vec<String>,
    /// Optional path to a GeoLite2/GeoIP2 MMDB file
    pub mmdb_path: Option<String>,
    /// Daemon cycle interval in minutes
    pub schedule_minutes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://proxies.db".to_string(),
            github_token: String::new(),
            github_queries: vec![
                "proxy".to_string(),
                "socks5".to_string(),
                "mtproto".to_string(),
                "shadowsocks".to_string(),
            ],
            github_code_pages: 5,
            github_repo_pages: 5,
            github_per_page: 50,
            github_max_blob_bytes: 250_000,
            source_urls: Vec::new(),
            check_timeout: Duration::from_secs(4),
            max_concurrent_checks: 100,
            max_candidates_per_cycle: 2000,
            country_whitelist: Vec::new(),
            country_blacklist: Vec::new(),
            mmdb_path: None,
            schedule_minutes: 15,
        }
    }
}

impl Settings {
    /// Build settings from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let queries = csv_env("GITHUB_QUERIES");
        let queries = if queries.is_empty() {
            defaults.github_queries.clone()
        } else {
            queries
        };

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            github_token: env::var("GITHUB_TOKEN").unwrap_or_default(),
            github_queries: queries,
            github_code_pages: parse_env("GITHUB_CODE_PAGES", defaults.github_code_pages),
            github_repo_pages: parse_env("GITHUB_REPO_PAGES", defaults.github_repo_pages),
            github_per_page: parse_env("GITHUB_PER_PAGE", defaults.github_per_page),
            github_max_blob_bytes: parse_env("GITHUB_MAX_BLOB_BYTES", defaults.github_max_blob_bytes),
            source_urls: csv_env("SOURCE_URLS"),
            check_timeout: Duration::from_secs_f64(parse_env("CHECK_TIMEOUT_SEC", 4.0)),
            max_concurrent_checks: parse_env("MAX_CONCURRENT_CHECKS", defaults.max_concurrent_checks),
            max_candidates_per_cycle: parse_env(
                "MAX_CANDIDATES_PER_CYCLE",
                defaults.max_candidates_per_cycle,
            ),
            country_whitelist: csv_env("COUNTRY_WHITELIST")
                .into_iter()
                .map(|c| c.to_uppercase())
                .collect(),
            country_blacklist: csv_env("COUNTRY_BLACKLIST")
                .into_iter()
                .map(|c| c.to_uppercase())
                .collect(),
            mmdb_path: env::var("MMDB_PATH").ok().filter(|p| !p.is_empty()),
            schedule_minutes: parse_env("SCHEDULE_MINUTES", defaults.schedule_minutes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.check_timeout, Duration::from_secs(4));
        assert_eq!(s.max_concurrent_checks, 100);
        assert_eq!(s.github_queries.len(), 4);
        assert!(s.github_token.is_empty());
    }

    #[test]
    fn test_csv_env_empty_is_empty_vec() {
        // An unset variable must not produce [""].
        assert!(csv_env("PROXY_HARVEST_NO_SUCH_VAR").is_empty());
    }
}
