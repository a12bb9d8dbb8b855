//! GitHub crawler collector
//!
//! Three-phase crawl of the GitHub REST API: code search for proxy-ish
//! files, repository discovery by keyword, and a deep scan of every
//! discovered repository (README plus the recursive file tree). All
//! requests share one small concurrency gate and a response policy that
//! waits out rate limits and retries transient faults.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::future;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::collectors::{Collector, RawDocument};
use crate::Result;

const GITHUB_API: &str = "https://api.github.com";

/// Concurrent API requests across the whole crawl
const CONCURRENT_REQUESTS: usize = 3;

/// Attempts per API call (rate-limit waits and 5xx both count)
const MAX_ATTEMPTS: u32 = 3;

/// Base delay for transient-fault backoff
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Longest we are willing to sleep for a rate-limit reset
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(120);

/// Blobs fetched per repository during a deep scan
const MAX_BLOBS_PER_REPO: usize = 200;

/// Repository cap in fast mode
const DEFAULT_FAST_REPO_CAP: usize = 4;

/// Accepted code-search files per query
const DEFAULT_MAX_FILES_PER_QUERY: usize = 80;

/// Reduced query set used in fast mode, one protocol each
const FAST_TARGETS: [(&str, &str); 4] = [
    ("socks5", "socks5 proxy list"),
    ("mtproto", "mtproto proxy telegram"),
    ("ss", "shadowsocks ss proxy"),
    ("http", "http proxy list"),
];

/// File extensions likely to hold plain-text proxy lists
static TEXT_EXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(txt|conf|cfg|ini|yaml|yml|json|csv|list|md)$")
        .expect("Invalid text extension regex")
});

/// Paths that smell like proxy material
static PROXYISH_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(proxy|socks|mtproto|shadow|v2ray|trojan|vpn|ss)")
        .expect("Invalid proxyish path regex")
});

/// Decode GitHub blob content: base64, wrapped in newlines, possibly
/// with broken padding; invalid UTF-8 bytes are replaced, not rejected.
fn decode_blob(content: &str) -> Option<String> {
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let missing = compact.len() % 4;
    let padded = if missing != 0 {
        format!("{}{}", compact, "=".repeat(4 - missing))
    } else {
        compact
    };
    let bytes = BASE64.decode(padded).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// True for tree/search paths worth downloading
fn is_interesting_path(path: &str) -> bool {
    TEXT_EXT_RE.is_match(path) || PROXYISH_PATH_RE.is_match(path)
}

/// Configuration for the GitHub collector
#[derive(Debug, Clone)]
pub struct GitHubCollectorConfig {
    /// API token; an empty token disables the collector
    pub token: String,
    /// Search keywords
    pub queries: Vec<String>,
    /// Pages per code-search query
    pub code_pages: u32,
    /// Pages per repository-search query
    pub repo_pages: u32,
    /// Results per page, clamped to 1..=100
    pub per_page: u32,
    /// Skip blobs larger than this
    pub max_blob_bytes: u64,
    /// Additional repositories to deep-scan (e.g. from the work queue)
    pub extra_repos: Vec<String>,
    /// Per-query cap on accepted code-search files
    pub max_files_per_query: usize,
    /// Reduced-breadth smoke-test mode
    pub fast_mode: bool,
    /// Repository cap in fast mode
    pub fast_repo_cap: usize,
}

impl Default for GitHubCollectorConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            queries: Vec::new(),
            code_pages: 5,
            repo_pages: 5,
            per_page: 50,
            max_blob_bytes: 250_000,
            extra_repos: Vec::new(),
            max_files_per_query: DEFAULT_MAX_FILES_PER_QUERY,
            fast_mode: false,
            fast_repo_cap: DEFAULT_FAST_REPO_CAP,
        }
    }
}

impl GitHubCollectorConfig {
    pub fn new(token: impl Into<String>, queries: Vec<String>) -> Self {
        Self {
            token: token.into(),
            queries,
            ..Self::default()
        }
    }

    pub fn with_pages(mut self, code_pages: u32, repo_pages: u32) -> Self {
        self.code_pages = code_pages;
        self.repo_pages = repo_pages;
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn with_max_blob_bytes(mut self, max_blob_bytes: u64) -> Self {
        self.max_blob_bytes = max_blob_bytes;
        self
    }

    pub fn with_extra_repos(mut self, extra_repos: Vec<String>) -> Self {
        self.extra_repos = extra_repos;
        self
    }

    pub fn with_fast_mode(mut self, fast_mode: bool) -> Self {
        self.fast_mode = fast_mode;
        self
    }
}

/// GitHub code/repository crawler
pub struct GitHubCollector {
    config: GitHubCollectorConfig,
    client: Client,
    gate: Arc<Semaphore>,
}

impl GitHubCollector {
    pub fn new(config: GitHubCollectorConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("proxy-harvest"));
        if !config.token.is_empty() {
            let bearer = format!("Bearer {}", config.token);
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&bearer)?);
        }

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            config,
            client,
            gate: Arc::new(Semaphore::new(CONCURRENT_REQUESTS)),
        })
    }

    fn per_page(&self) -> u32 {
        self.config.per_page.clamp(1, 100)
    }

    /// One API call under the shared gate, with the full response
    /// policy: 200 → JSON body; 403 with an exhausted rate limit →
    /// sleep until reset (capped) and retry; other 403/404/422 →
    /// permanent failure; 5xx and transport faults → backoff retry.
    /// Exhaustion yields `None` without failing the crawl.
    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Option<Value> {
        for attempt in 0..MAX_ATTEMPTS {
            let response = {
                let _permit = self.gate.acquire().await.ok()?;
                self.client.get(url).query(params).send().await
            };

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::OK {
                        return resp.json().await.ok();
                    }
                    if status == StatusCode::FORBIDDEN {
                        if let Some(wait) = rate_limit_wait(resp.headers()) {
                            tracing::warn!(
                                url,
                                wait_secs = wait.as_secs(),
                                "rate limit exhausted, waiting for reset"
                            );
                            tokio::time::sleep(wait).await;
                            continue;
                        }
                        tracing::debug!(url, "forbidden without rate-limit header, giving up");
                        return None;
                    }
                    if status == StatusCode::NOT_FOUND || status == StatusCode::UNPROCESSABLE_ENTITY
                    {
                        tracing::debug!(url, status = status.as_u16(), "permanent API failure");
                        return None;
                    }
                    if status.is_server_error() {
                        tracing::warn!(url, status = status.as_u16(), "server error, backing off");
                        backoff_sleep(attempt).await;
                        continue;
                    }
                    tracing::debug!(url, status = status.as_u16(), "unexpected API status");
                    return None;
                }
                Err(err) => {
                    tracing::warn!(url, error = %err, "API request failed, backing off");
                    backoff_sleep(attempt).await;
                }
            }
        }
        None
    }

    /// Phase 1: code search. Pagination per query, stopping early on an
    /// empty page or when the accepted-file cap is reached.
    async fn code_search_for_query(&self, query: &str) -> Vec<RawDocument> {
        tracing::info!(query, "GitHub code search");
        let url = format!("{GITHUB_API}/search/code");
        let mut docs = Vec::new();

        'pages: for page in 1..=self.config.code_pages {
            let params = [
                ("q", format!("{query} in:file")),
                ("per_page", self.per_page().to_string()),
                ("page", page.to_string()),
            ];
            let Some(payload) = self.get_json(&url, &params).await else {
                break;
            };
            let items = match payload.get("items").and_then(Value::as_array) {
                Some(items) if !items.is_empty() => items.clone(),
                _ => break,
            };

            for item in items {
                let path = item.get("path").and_then(Value::as_str).unwrap_or("");
                if !path.is_empty() && !PROXYISH_PATH_RE.is_match(path) {
                    continue;
                }
                let Some(api_url) = item.get("url").and_then(Value::as_str) else {
                    continue;
                };
                let source = item
                    .get("html_url")
                    .and_then(Value::as_str)
                    .unwrap_or("github");

                let Some(file_payload) = self.get_json(api_url, &[]).await else {
                    continue;
                };
                let Some(content) = file_payload.get("content").and_then(Value::as_str) else {
                    continue;
                };
                let Some(text) = decode_blob(content) else {
                    continue;
                };
                docs.push(RawDocument::new(source, text));
                if docs.len() >= self.config.max_files_per_query {
                    break 'pages;
                }
            }
        }
        docs
    }

    /// Phase 2: repository discovery by keyword, most recently updated
    /// first. Returns lowercased `owner/name` identifiers.
    async fn discover_repos_for_query(&self, query: &str) -> BTreeSet<String> {
        let url = format!("{GITHUB_API}/search/repositories");
        let mut repos = BTreeSet::new();

        for page in 1..=self.config.repo_pages {
            let params = [
                (
                    "q",
                    format!("{query} proxy socks mtproto shadowsocks in:readme,description"),
                ),
                ("sort", "updated".to_string()),
                ("order", "desc".to_string()),
                ("per_page", self.per_page().to_string()),
                ("page", page.to_string()),
            ];
            let Some(payload) = self.get_json(&url, &params).await else {
                break;
            };
            let items = match payload.get("items").and_then(Value::as_array) {
                Some(items) if !items.is_empty() => items.clone(),
                _ => break,
            };
            repos.extend(
                items
                    .iter()
                    .filter_map(|item| item.get("full_name").and_then(Value::as_str))
                    .map(str::to_lowercase),
            );
        }
        repos
    }

    /// Fast-mode repository discovery: one page per fixed protocol
    /// query, first hit each, bounded by the fast repo cap.
    async fn discover_fast_repos(&self) -> BTreeSet<String> {
        let url = format!("{GITHUB_API}/search/repositories");
        let mut repos = BTreeSet::new();

        for (proto, query) in FAST_TARGETS {
            if repos.len() >= self.config.fast_repo_cap {
                break;
            }
            let params = [
                ("q", query.to_string()),
                ("sort", "updated".to_string()),
                ("order", "desc".to_string()),
                ("per_page", "20".to_string()),
                ("page", "1".to_string()),
            ];
            let Some(payload) = self.get_json(&url, &params).await else {
                continue;
            };
            let first = payload
                .get("items")
                .and_then(Value::as_array)
                .and_then(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.get("full_name").and_then(Value::as_str))
                        .map(str::to_lowercase)
                        .find(|name| !repos.contains(name))
                });
            if let Some(name) = first {
                tracing::info!(proto, repo = %name, "fast mode selected repo");
                repos.insert(name);
            }
        }
        repos
    }

    /// Phase 3: deep scan of one repository — README plus every
    /// interesting blob of the recursive tree, up to the per-repo cap.
    async fn scan_repo(&self, repo: &str) -> Vec<RawDocument> {
        let Some(meta) = self.get_json(&format!("{GITHUB_API}/repos/{repo}"), &[]).await else {
            return Vec::new();
        };
        let default_branch = meta
            .get("default_branch")
            .and_then(Value::as_str)
            .unwrap_or("main")
            .to_string();

        let mut docs = Vec::new();

        if let Some(readme) = self.get_json(&format!("{GITHUB_API}/repos/{repo}/readme"), &[]).await
        {
            if let Some(text) = readme
                .get("content")
                .and_then(Value::as_str)
                .and_then(decode_blob)
            {
                docs.push(RawDocument::new(format!("https://github.com/{repo}#readme"), text));
            }
        }

        let tree_url = format!("{GITHUB_API}/repos/{repo}/git/trees/{default_branch}");
        let Some(tree) = self.get_json(&tree_url, &[("recursive", "1".to_string())]).await else {
            return docs;
        };
        let Some(entries) = tree.get("tree").and_then(Value::as_array) else {
            return docs;
        };

        let blobs: Vec<(String, String)> = entries
            .iter()
            .filter(|e| e.get("type").and_then(Value::as_str) == Some("blob"))
            .filter(|e| {
                e.get("size").and_then(Value::as_u64).unwrap_or(0) <= self.config.max_blob_bytes
            })
            .filter_map(|e| {
                let path = e.get("path").and_then(Value::as_str)?;
                let sha = e.get("sha").and_then(Value::as_str)?;
                is_interesting_path(path).then(|| (sha.to_string(), path.to_string()))
            })
            .take(MAX_BLOBS_PER_REPO)
            .collect();

        for (sha, path) in blobs {
            let blob_url = format!("{GITHUB_API}/repos/{repo}/git/blobs/{sha}");
            let Some(payload) = self.get_json(&blob_url, &[]).await else {
                continue;
            };
            if payload.get("encoding").and_then(Value::as_str) != Some("base64") {
                continue;
            }
            let Some(text) = payload
                .get("content")
                .and_then(Value::as_str)
                .and_then(decode_blob)
            else {
                continue;
            };
            docs.push(RawDocument::new(
                format!("https://github.com/{repo}/blob/{default_branch}/{path}"),
                text,
            ));
        }
        docs
    }
}

#[async_trait]
impl Collector for GitHubCollector {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn collect(&self) -> Result<Vec<RawDocument>> {
        if self.config.token.is_empty() {
            tracing::warn!("GitHub token is empty, collector disabled");
            return Ok(Vec::new());
        }

        tracing::info!(
            queries = self.config.queries.len(),
            fast_mode = self.config.fast_mode,
            "GitHub collector started"
        );

        let mut out: Vec<RawDocument> = Vec::new();
        let mut repos: BTreeSet<String> = self
            .config
            .extra_repos
            .iter()
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty())
            .collect();

        if self.config.fast_mode {
            repos.extend(self.discover_fast_repos().await);
        } else {
            let code_docs = future::join_all(
                self.config.queries.iter().map(|q| self.code_search_for_query(q)),
            )
            .await;
            out.extend(code_docs.into_iter().flatten());

            let discovered = future::join_all(
                self.config.queries.iter().map(|q| self.discover_repos_for_query(q)),
            )
            .await;
            repos.extend(discovered.into_iter().flatten());
        }

        tracing::info!(count = repos.len(), "deep scanning repositories");
        let scans = future::join_all(repos.iter().map(|repo| self.scan_repo(repo))).await;
        out.extend(scans.into_iter().flatten());

        // Canonical-URL dedup, first occurrence wins.
        let mut seen: HashSet<String> = HashSet::new();
        out.retain(|doc| seen.insert(doc.source.clone()));

        tracing::info!(documents = out.len(), "GitHub collector finished");
        Ok(out)
    }
}

/// Sleep `BASE_DELAY * 2^attempt` unless this was the last attempt.
async fn backoff_sleep(attempt: u32) {
    if attempt + 1 < MAX_ATTEMPTS {
        tokio::time::sleep(BASE_DELAY * 2u32.saturating_pow(attempt)).await;
    }
}

/// Wait duration until the rate limit resets, if the response says the
/// limit is exhausted. Capped at [`MAX_RATE_LIMIT_WAIT`].
fn rate_limit_wait(headers: &HeaderMap) -> Option<Duration> {
    let remaining = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())?;
    if remaining.trim() != "0" {
        return None;
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let reset = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(now + 60);

    let wait = Duration::from_secs(reset.saturating_sub(now).max(1));
    Some(wait.min(MAX_RATE_LIMIT_WAIT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxyish_path_filter() {
        assert!(PROXYISH_PATH_RE.is_match("configs/socks5_list.txt"));
        assert!(PROXYISH_PATH_RE.is_match("src/mtproto_proxy.py"));
        assert!(!PROXYISH_PATH_RE.is_match("docs/changelog.md"));
    }

    #[test]
    fn test_interesting_paths() {
        assert!(is_interesting_path("anything.txt"));
        assert!(is_interesting_path("deep/dir/servers.yaml"));
        assert!(is_interesting_path("tools/proxy_scan.go"));
        assert!(!is_interesting_path("src/main.rs"));
    }

    #[test]
    fn test_decode_blob_handles_wrapped_base64() {
        // GitHub wraps blob content at 60 columns.
        let encoded = BASE64.encode("socks5://1.2.3.4:1080\nhttp://5.6.7.8:8080\n");
        let wrapped: String = encoded
            .as_bytes()
            .chunks(10)
            .map(|c| format!("{}\n", std::str::from_utf8(c).unwrap()))
            .collect();
        let decoded = decode_blob(&wrapped).unwrap();
        assert!(decoded.contains("socks5://1.2.3.4:1080"));
    }

    #[test]
    fn test_decode_blob_rejects_garbage() {
        assert!(decode_blob("!!!not-base64!!!").is_none());
    }

    #[test]
    fn test_rate_limit_wait_parses_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        let reset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 30;
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&reset.to_string()).unwrap(),
        );
        let wait = rate_limit_wait(&headers).unwrap();
        assert!(wait >= Duration::from_secs(1));
        assert!(wait <= Duration::from_secs(31));
    }

    #[test]
    fn test_rate_limit_wait_ignores_unrelated_403() {
        let headers = HeaderMap::new();
        assert!(rate_limit_wait(&headers).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("42"));
        assert!(rate_limit_wait(&headers).is_none());
    }

    #[test]
    fn test_rate_limit_wait_is_capped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        let far_future = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 86_400;
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&far_future.to_string()).unwrap(),
        );
        assert_eq!(rate_limit_wait(&headers).unwrap(), MAX_RATE_LIMIT_WAIT);
    }

    #[tokio::test]
    async fn test_missing_token_disables_collector() {
        let collector =
            GitHubCollector::new(GitHubCollectorConfig::new("", vec!["proxy".to_string()]))
                .unwrap();
        let docs = collector.collect().await.unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_config_defaults_and_builders() {
        let config = GitHubCollectorConfig::new("tok", vec!["socks5".to_string()])
            .with_pages(2, 3)
            .with_per_page(500)
            .with_extra_repos(vec!["Owner/Repo".to_string()])
            .with_fast_mode(true);
        assert_eq!(config.code_pages, 2);
        assert_eq!(config.repo_pages, 3);
        assert_eq!(config.per_page, 500);
        assert!(config.fast_mode);

        let collector = GitHubCollector::new(config).unwrap();
        assert_eq!(collector.per_page(), 100);
    }
}
