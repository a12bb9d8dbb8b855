//! Discovery-to-score pipeline orchestration
//!
//! One `run_once` call drains the repo work queue, runs all collectors
//! concurrently, extracts and validates candidates, resolves countries,
//! persists outcomes and finalizes queue state. The caller is expected
//! to serialize runs; nothing here self-enforces that.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::IpAddr;

use futures::future;
use serde::{Deserialize, Serialize};

use crate::collectors::{Collector, GitHubCollector, GitHubCollectorConfig, UrlListCollector};
use crate::config::Settings;
use crate::database::{RepoStatus, Store};
use crate::proxy::{
    extract, CountryResolver, ProxyCandidate, ProxyType, ProxyValidator, ValidatorConfig,
};
use crate::Result;

/// Pending repos pulled into one cycle
const QUEUE_DRAIN_LIMIT: i64 = 100;

/// Counters reported by one pipeline cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Raw documents gathered by all collectors
    pub raw_sources: usize,
    /// Candidates left after dedup and the per-cycle cap
    pub candidates: usize,
    /// Outcomes persisted (post country filter)
    pub saved: usize,
    /// Persisted outcomes that were alive
    pub alive: usize,
}

/// Deduplicate by identity key, keeping first occurrences, and cap the
/// batch so one oversized crawl cannot stall validation for hours.
fn prepare_candidates(candidates: Vec<ProxyCandidate>, limit: usize) -> Vec<ProxyCandidate> {
    let mut seen: HashSet<(ProxyType, String, u16)> = HashSet::new();
    let mut out = Vec::new();
    for candidate in candidates {
        let key = (candidate.proxy_type, candidate.host.clone(), candidate.port);
        if seen.insert(key) {
            out.push(candidate);
            if out.len() >= limit {
                break;
            }
        }
    }
    out
}

fn is_ip(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok()
}

/// Sequences one full discovery-to-score cycle
pub struct Pipeline {
    settings: Settings,
    store: Store,
}

impl Pipeline {
    /// Connect the store and build a pipeline.
    pub async fn new(settings: Settings) -> Result<Self> {
        let store = Store::connect(&settings.database_url).await?;
        Ok(Self::from_parts(settings, store))
    }

    /// Build a pipeline over an existing store.
    pub fn from_parts(settings: Settings, store: Store) -> Self {
        Self { settings, store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run one complete cycle. `fast_mode` reduces crawl breadth for
    /// operational smoke tests; behavior is otherwise identical.
    pub async fn run_once(&self, fast_mode: bool) -> Result<RunStats> {
        // Drain the work queue and hand the repos to the crawler.
        let queued_repos = self.store.pending_repos(QUEUE_DRAIN_LIMIT).await?;
        for repo in &queued_repos {
            self.store
                .mark_repo_status(repo, RepoStatus::Processing, None)
                .await?;
        }

        let github_config = GitHubCollectorConfig::new(
            self.settings.github_token.clone(),
            self.settings.github_queries.clone(),
        )
        .with_pages(self.settings.github_code_pages, self.settings.github_repo_pages)
        .with_per_page(self.settings.github_per_page)
        .with_max_blob_bytes(self.settings.github_max_blob_bytes)
        .with_extra_repos(queued_repos.clone())
        .with_fast_mode(fast_mode);

        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(GitHubCollector::new(github_config)?),
            Box::new(UrlListCollector::new(self.settings.source_urls.clone())?),
        ];

        // Collectors run concurrently; a fatal fault in one degrades
        // the cycle but never discards what the others gathered.
        let mut raws = Vec::new();
        let mut collect_failed = false;
        let results = future::join_all(collectors.iter().map(|c| c.collect())).await;
        for (collector, result) in collectors.iter().zip(results) {
            match result {
                Ok(docs) => {
                    tracing::info!(collector = collector.name(), documents = docs.len(), "collected");
                    raws.extend(docs);
                }
                Err(err) => {
                    tracing::error!(collector = collector.name(), error = %err, "collector failed");
                    collect_failed = true;
                }
            }
        }

        let raw_sources = raws.len();

        // Large-batch regex extraction is CPU bound; keep it off the
        // I/O scheduler.
        let default_scheme = ProxyType::Http;
        let extracted = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for doc in &raws {
                out.extend(extract(&doc.text, &doc.source, default_scheme));
            }
            out
        })
        .await?;

        let candidates =
            prepare_candidates(extracted, self.settings.max_candidates_per_cycle);
        let candidate_count = candidates.len();
        tracing::info!(raw_sources, candidates = candidate_count, "validating candidates");

        let validator = ProxyValidator::with_config(
            ValidatorConfig::new()
                .with_timeout(self.settings.check_timeout)
                .with_max_concurrency(self.settings.max_concurrent_checks),
        );
        let outcomes = validator.validate(candidates).await;

        // Countries for unique alive IP hosts, resolved concurrently;
        // the resolver memoizes for the rest of the run.
        let resolver = CountryResolver::new(self.settings.mmdb_path.as_deref());
        let unique_ips: BTreeSet<&str> = outcomes
            .iter()
            .filter(|o| o.is_alive && is_ip(&o.candidate.host))
            .map(|o| o.candidate.host.as_str())
            .collect();
        let resolver_ref = &resolver;
        let countries: HashMap<String, Option<String>> =
            future::join_all(unique_ips.into_iter().map(|ip| async move {
                (ip.to_string(), resolver_ref.country_of(ip).await)
            }))
            .await
            .into_iter()
            .collect();

        let mut saved = 0;
        let mut alive = 0;
        for outcome in &outcomes {
            let country = countries
                .get(outcome.candidate.host.as_str())
                .cloned()
                .flatten();

            if let Some(code) = country.as_deref() {
                if !self.settings.country_whitelist.is_empty()
                    && !self.settings.country_whitelist.iter().any(|c| c == code)
                {
                    continue;
                }
                if self.settings.country_blacklist.iter().any(|c| c == code) {
                    continue;
                }
            }

            self.store
                .upsert_observation(
                    &outcome.candidate,
                    country.as_deref(),
                    outcome.is_alive,
                    outcome.latency_ms,
                )
                .await?;
            saved += 1;
            if outcome.is_alive {
                alive += 1;
            }
        }

        // Finalize queue state: a degraded collect fails the cycle's
        // repos, a clean one completes them.
        let (status, note) = if collect_failed {
            (RepoStatus::Failed, Some("collect_error"))
        } else {
            (RepoStatus::Done, None)
        };
        for repo in &queued_repos {
            self.store.mark_repo_status(repo, status, note).await?;
        }

        let stats = RunStats {
            raw_sources,
            candidates: candidate_count,
            saved,
            alive,
        };
        self.store
            .record_run(
                stats.raw_sources as i64,
                stats.candidates as i64,
                stats.saved as i64,
                stats.alive as i64,
            )
            .await?;

        tracing::info!(?stats, "pipeline cycle finished");
        Ok(stats)
    }
}
