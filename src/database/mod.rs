//! SQLite-backed proxy catalog, observation log and repo work queue

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, SqlitePool};
use std::str::FromStr;

use crate::proxy::ProxyCandidate;
use crate::Result;

pub mod records;

pub use records::{
    CountryCount, DashboardStats, EnqueueOutcome, ObservationRecord, PipelineRun, ProxyRecord,
    QueueStats, RepoStatus, RepoTask,
};

/// Weight of the newest observation in the reliability EWMA
pub const EWMA_ALPHA: f64 = 0.2;

/// Score weight of `success_rate` for dead proxies
pub const DEAD_RATE_WEIGHT: f64 = 30.0;

/// Score weight of `success_rate` for alive proxies
pub const ALIVE_RATE_WEIGHT: f64 = 60.0;

/// Latency above this contributes nothing to the score
pub const LATENCY_CUTOFF_MS: f64 = 1000.0;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS proxies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    proxy_type TEXT NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    country TEXT,
    source TEXT NOT NULL,
    is_alive INTEGER NOT NULL DEFAULT 0,
    latency_ms REAL,
    success_rate REAL NOT NULL DEFAULT 0.0,
    score REAL NOT NULL DEFAULT 0.0,
    last_checked_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (proxy_type, host, port)
);
CREATE INDEX IF NOT EXISTS idx_proxies_is_alive ON proxies (is_alive);
CREATE INDEX IF NOT EXISTS idx_proxies_score ON proxies (score);
CREATE INDEX IF NOT EXISTS idx_proxies_country ON proxies (country);

CREATE TABLE IF NOT EXISTS observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    proxy_type TEXT NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    is_alive INTEGER NOT NULL,
    latency_ms REAL,
    source TEXT NOT NULL,
    checked_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_observations_checked_at ON observations (checked_at);

CREATE TABLE IF NOT EXISTS repo_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_full_name TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'pending',
    note TEXT,
    queued_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_analyzed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_repo_tasks_status ON repo_tasks (status);

CREATE TABLE IF NOT EXISTS pipeline_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    raw_sources INTEGER NOT NULL DEFAULT 0,
    candidates INTEGER NOT NULL DEFAULT 0,
    saved INTEGER NOT NULL DEFAULT 0,
    alive INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
"#;

/// Proxy catalog score on the 0-100 scale.
///
/// Dead proxies keep only a fraction of their historical reliability;
/// alive ones are rewarded for reliability and low latency. A missing
/// latency counts as the cutoff (zero latency points).
pub fn score(is_alive: bool, latency_ms: Option<f64>, success_rate: f64) -> f64 {
    if !is_alive {
        return (success_rate * DEAD_RATE_WEIGHT).min(100.0);
    }
    let latency = latency_ms.unwrap_or(LATENCY_CUTOFF_MS);
    let latency_score = (LATENCY_CUTOFF_MS - latency).max(0.0) / 10.0;
    (success_rate * ALIVE_RATE_WEIGHT + latency_score).min(100.0)
}

/// Relational store for the proxy catalog, observation history,
/// repo-scan work queue and pipeline run log.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory store, used by tests.
    /// A single never-recycled connection keeps the database alive.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if !statement.is_empty() {
                sqlx::query(statement).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    /// Record one validation outcome for a candidate.
    ///
    /// Inserts a fresh catalog row or EWMA-blends an existing one, then
    /// appends an observation row. Both writes happen in a single
    /// transaction: either the catalog and the history agree, or
    /// neither changed.
    pub async fn upsert_observation(
        &self,
        candidate: &ProxyCandidate,
        country: Option<&str>,
        is_alive: bool,
        latency_ms: Option<f64>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let proxy_type = candidate.proxy_type.as_str();

        let existing: Option<(i64, f64)> = sqlx::query_as(
            "SELECT id, success_rate FROM proxies WHERE proxy_type = ? AND host = ? AND port = ?",
        )
        .bind(proxy_type)
        .bind(&candidate.host)
        .bind(candidate.port)
        .fetch_optional(&mut *tx)
        .await?;

        match existing {
            None => {
                let success_rate = if is_alive { 1.0 } else { 0.0 };
                sqlx::query(
                    "INSERT INTO proxies \
                     (proxy_type, host, port, country, source, is_alive, latency_ms, \
                      success_rate, score, last_checked_at, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(proxy_type)
                .bind(&candidate.host)
                .bind(candidate.port)
                .bind(country)
                .bind(&candidate.source)
                .bind(is_alive)
                .bind(latency_ms)
                .bind(success_rate)
                .bind(score(is_alive, latency_ms, success_rate))
                .bind(now)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            Some((id, old_rate)) => {
                let observed = if is_alive { 1.0 } else { 0.0 };
                let success_rate = old_rate * (1.0 - EWMA_ALPHA) + observed * EWMA_ALPHA;
                sqlx::query(
                    "UPDATE proxies SET is_alive = ?, latency_ms = ?, \
                     country = COALESCE(?, country), source = ?, success_rate = ?, \
                     score = ?, last_checked_at = ?, updated_at = ? WHERE id = ?",
                )
                .bind(is_alive)
                .bind(latency_ms)
                .bind(country)
                .bind(&candidate.source)
                .bind(success_rate)
                .bind(score(is_alive, latency_ms, success_rate))
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query(
            "INSERT INTO observations \
             (proxy_type, host, port, is_alive, latency_ms, source, checked_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(proxy_type)
        .bind(&candidate.host)
        .bind(candidate.port)
        .bind(is_alive)
        .bind(latency_ms)
        .bind(&candidate.source)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Look up one catalog row by identity key.
    pub async fn find_proxy(
        &self,
        proxy_type: &str,
        host: &str,
        port: u16,
    ) -> Result<Option<ProxyRecord>> {
        let record = sqlx::query_as::<_, ProxyRecord>(
            "SELECT * FROM proxies WHERE proxy_type = ? AND host = ? AND port = ?",
        )
        .bind(proxy_type)
        .bind(host)
        .bind(port)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Best alive proxies by score, optionally restricted to countries.
    pub async fn top_alive(
        &self,
        limit: i64,
        countries: Option<&[String]>,
    ) -> Result<Vec<ProxyRecord>> {
        let mut qb = QueryBuilder::new("SELECT * FROM proxies WHERE is_alive = 1");
        if let Some(countries) = countries.filter(|c| !c.is_empty()) {
            qb.push(" AND country IN (");
            let mut separated = qb.separated(", ");
            for country in countries {
                separated.push_bind(country);
            }
            qb.push(")");
        }
        qb.push(" ORDER BY score DESC LIMIT ");
        qb.push_bind(limit);

        let records = qb
            .build_query_as::<ProxyRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// Queue a repository for deep scanning.
    ///
    /// Only names never seen before create a task; `done` repos report
    /// `AlreadyAnalyzed`, everything else `AlreadyQueued`. Names are
    /// trimmed and lowercased before comparison.
    pub async fn enqueue_repo(
        &self,
        repo_full_name: &str,
        note: Option<&str>,
    ) -> Result<EnqueueOutcome> {
        let repo = repo_full_name.trim().to_lowercase();
        let existing: Option<String> =
            sqlx::query_scalar("SELECT status FROM repo_tasks WHERE repo_full_name = ?")
                .bind(&repo)
                .fetch_optional(&self.pool)
                .await?;

        match existing.as_deref() {
            Some("done") => Ok(EnqueueOutcome::AlreadyAnalyzed),
            Some(_) => Ok(EnqueueOutcome::AlreadyQueued),
            None => {
                let now = Utc::now();
                sqlx::query(
                    "INSERT INTO repo_tasks (repo_full_name, status, note, queued_at, updated_at) \
                     VALUES (?, 'pending', ?, ?, ?)",
                )
                .bind(&repo)
                .bind(note)
                .bind(now)
                .bind(now)
                .execute(&self.pool)
                .await?;
                Ok(EnqueueOutcome::Queued)
            }
        }
    }

    /// Oldest pending repositories, FIFO by enqueue time.
    pub async fn pending_repos(&self, limit: i64) -> Result<Vec<String>> {
        let repos = sqlx::query_scalar(
            "SELECT repo_full_name FROM repo_tasks WHERE status = 'pending' \
             ORDER BY queued_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(repos)
    }

    /// Move a task to a new status; `done` stamps `last_analyzed_at`.
    /// Unknown names are ignored.
    pub async fn mark_repo_status(
        &self,
        repo_full_name: &str,
        status: RepoStatus,
        note: Option<&str>,
    ) -> Result<()> {
        let repo = repo_full_name.trim().to_lowercase();
        let now = Utc::now();
        if status == RepoStatus::Done {
            sqlx::query(
                "UPDATE repo_tasks SET status = ?, note = ?, updated_at = ?, \
                 last_analyzed_at = ? WHERE repo_full_name = ?",
            )
            .bind(status.as_str())
            .bind(note)
            .bind(now)
            .bind(now)
            .bind(&repo)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE repo_tasks SET status = ?, note = ?, updated_at = ? \
                 WHERE repo_full_name = ?",
            )
            .bind(status.as_str())
            .bind(note)
            .bind(now)
            .bind(&repo)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Fetch one task row by normalized name.
    pub async fn repo_task(&self, repo_full_name: &str) -> Result<Option<RepoTask>> {
        let repo = repo_full_name.trim().to_lowercase();
        let task = sqlx::query_as::<_, RepoTask>(
            "SELECT * FROM repo_tasks WHERE repo_full_name = ?",
        )
        .bind(&repo)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    /// Per-status queue counts.
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM repo_tasks GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("n")?;
            match status.as_str() {
                "pending" => stats.pending = count,
                "processing" => stats.processing = count,
                "done" => stats.done = count,
                "failed" => stats.failed = count,
                _ => {}
            }
        }
        Ok(stats)
    }

    /// Append one pipeline run snapshot.
    pub async fn record_run(
        &self,
        raw_sources: i64,
        candidates: i64,
        saved: i64,
        alive: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO pipeline_runs (raw_sources, candidates, saved, alive, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(raw_sources)
        .bind(candidates)
        .bind(saved)
        .bind(alive)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent pipeline run, if any.
    pub async fn latest_run(&self) -> Result<Option<PipelineRun>> {
        let run = sqlx::query_as::<_, PipelineRun>(
            "SELECT * FROM pipeline_runs ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(run)
    }

    /// Aggregate snapshot: catalog totals, top countries among alive
    /// proxies, latest run, queue counts and observation volume over
    /// the trailing 24 hours.
    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let total_proxies: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM proxies")
            .fetch_one(&self.pool)
            .await?;
        let alive_proxies: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM proxies WHERE is_alive = 1")
                .fetch_one(&self.pool)
                .await?;
        let countries_top = sqlx::query_as::<_, CountryCount>(
            "SELECT country, COUNT(*) AS count FROM proxies \
             WHERE is_alive = 1 AND country IS NOT NULL \
             GROUP BY country ORDER BY COUNT(*) DESC LIMIT 10",
        )
        .fetch_all(&self.pool)
        .await?;
        let since = Utc::now() - ChronoDuration::hours(24);
        let observations_24h: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM observations WHERE checked_at >= ?")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;

        Ok(DashboardStats {
            total_proxies,
            alive_proxies,
            countries_top,
            queue: self.queue_stats().await?,
            latest_run: self.latest_run().await?,
            observations_24h,
        })
    }

    /// Total rows in the observation log.
    pub async fn observation_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM observations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Newest observation rows, for external trend computation.
    pub async fn recent_observations(&self, limit: i64) -> Result<Vec<ObservationRecord>> {
        let rows = sqlx::query_as::<_, ObservationRecord>(
            "SELECT * FROM observations ORDER BY checked_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyType;

    fn candidate(host: &str, port: u16) -> ProxyCandidate {
        ProxyCandidate::new(ProxyType::Http, host, port, "test-source")
    }

    #[tokio::test]
    async fn test_insert_then_lookup() {
        let store = Store::in_memory().await.unwrap();
        store
            .upsert_observation(&candidate("1.2.3.4", 8080), Some("US"), true, Some(120.0))
            .await
            .unwrap();

        let record = store.find_proxy("http", "1.2.3.4", 8080).await.unwrap().unwrap();
        assert!(record.is_alive);
        assert_eq!(record.country.as_deref(), Some("US"));
        assert_eq!(record.success_rate, 1.0);
        assert!(record.score > 0.0);
        assert!(record.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_new_dead_record_starts_at_zero() {
        let store = Store::in_memory().await.unwrap();
        store
            .upsert_observation(&candidate("1.2.3.4", 8080), None, false, None)
            .await
            .unwrap();

        let record = store.find_proxy("http", "1.2.3.4", 8080).await.unwrap().unwrap();
        assert!(!record.is_alive);
        assert_eq!(record.success_rate, 0.0);
        assert_eq!(record.score, 0.0);
    }

    #[tokio::test]
    async fn test_ewma_converges_and_is_monotonic() {
        let store = Store::in_memory().await.unwrap();
        let c = candidate("1.2.3.4", 8080);

        store.upsert_observation(&c, None, false, None).await.unwrap();
        let mut prev = store
            .find_proxy("http", "1.2.3.4", 8080)
            .await
            .unwrap()
            .unwrap()
            .success_rate;
        // Repeated alive observations drive the rate up toward 1.
        for _ in 0..10 {
            store.upsert_observation(&c, None, true, Some(100.0)).await.unwrap();
            let rate = store
                .find_proxy("http", "1.2.3.4", 8080)
                .await
                .unwrap()
                .unwrap()
                .success_rate;
            assert!(rate > prev);
            prev = rate;
        }
        assert!(prev > 0.85);

        // Repeated dead observations drive it back down toward 0.
        for _ in 0..10 {
            store.upsert_observation(&c, None, false, None).await.unwrap();
            let rate = store
                .find_proxy("http", "1.2.3.4", 8080)
                .await
                .unwrap()
                .unwrap()
                .success_rate;
            assert!(rate < prev);
            prev = rate;
        }
        assert!(prev < 0.15);
    }

    #[tokio::test]
    async fn test_ewma_blend_matches_constants() {
        let store = Store::in_memory().await.unwrap();
        let c = candidate("1.2.3.4", 8080);

        store.upsert_observation(&c, None, true, Some(50.0)).await.unwrap();
        store.upsert_observation(&c, None, false, None).await.unwrap();
        let record = store.find_proxy("http", "1.2.3.4", 8080).await.unwrap().unwrap();
        // 1.0 * 0.8 + 0.0 * 0.2
        assert!((record.success_rate - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_score_dead_uses_history_only() {
        assert_eq!(score(false, None, 0.0), 0.0);
        assert_eq!(score(false, Some(10.0), 1.0), 30.0);
        assert_eq!(score(false, None, 0.5), 15.0);
    }

    #[test]
    fn test_score_alive_rewards_low_latency() {
        // Equal success rate: lower latency never scores worse.
        let fast = score(true, Some(100.0), 0.5);
        let slow = score(true, Some(900.0), 0.5);
        assert!(fast >= slow);

        // Beyond the cutoff the latency term is zero.
        assert_eq!(score(true, Some(1500.0), 1.0), 60.0);
        assert_eq!(score(true, None, 1.0), 60.0);

        // Capped at 100.
        assert!(score(true, Some(0.0), 1.0) <= 100.0);
    }

    #[tokio::test]
    async fn test_country_kept_when_later_unknown() {
        let store = Store::in_memory().await.unwrap();
        let c = candidate("1.2.3.4", 8080);

        store.upsert_observation(&c, Some("DE"), true, Some(50.0)).await.unwrap();
        store.upsert_observation(&c, None, true, Some(60.0)).await.unwrap();
        let record = store.find_proxy("http", "1.2.3.4", 8080).await.unwrap().unwrap();
        assert_eq!(record.country.as_deref(), Some("DE"));
    }

    #[tokio::test]
    async fn test_every_upsert_appends_one_observation() {
        let store = Store::in_memory().await.unwrap();
        let c = candidate("1.2.3.4", 8080);

        store.upsert_observation(&c, None, true, Some(50.0)).await.unwrap();
        store.upsert_observation(&c, None, false, None).await.unwrap();
        store.upsert_observation(&c, None, true, Some(70.0)).await.unwrap();
        assert_eq!(store.observation_count().await.unwrap(), 3);

        let recent = store.recent_observations(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].is_alive);
        assert_eq!(recent[0].latency_ms, Some(70.0));
    }

    #[tokio::test]
    async fn test_queue_state_machine() {
        let store = Store::in_memory().await.unwrap();

        let outcome = store.enqueue_repo("Owner/Repo", None).await.unwrap();
        assert_eq!(outcome, EnqueueOutcome::Queued);
        assert!(outcome.created());

        let outcome = store.enqueue_repo("owner/repo", None).await.unwrap();
        assert_eq!(outcome, EnqueueOutcome::AlreadyQueued);

        store
            .mark_repo_status("owner/repo", RepoStatus::Done, None)
            .await
            .unwrap();
        let outcome = store.enqueue_repo("owner/repo", None).await.unwrap();
        assert_eq!(outcome, EnqueueOutcome::AlreadyAnalyzed);
    }

    #[tokio::test]
    async fn test_pending_repos_fifo_with_limit() {
        let store = Store::in_memory().await.unwrap();
        store.enqueue_repo("a/one", None).await.unwrap();
        store.enqueue_repo("b/two", None).await.unwrap();
        store.enqueue_repo("c/three", None).await.unwrap();
        store
            .mark_repo_status("b/two", RepoStatus::Processing, None)
            .await
            .unwrap();

        let pending = store.pending_repos(10).await.unwrap();
        assert_eq!(pending, vec!["a/one".to_string(), "c/three".to_string()]);

        let limited = store.pending_repos(1).await.unwrap();
        assert_eq!(limited, vec!["a/one".to_string()]);
    }

    #[tokio::test]
    async fn test_done_stamps_last_analyzed_at() {
        let store = Store::in_memory().await.unwrap();
        store.enqueue_repo("a/one", None).await.unwrap();

        store
            .mark_repo_status("a/one", RepoStatus::Processing, None)
            .await
            .unwrap();
        let task = store.repo_task("a/one").await.unwrap().unwrap();
        assert_eq!(task.status, "processing");
        assert!(task.last_analyzed_at.is_none());

        store
            .mark_repo_status("a/one", RepoStatus::Done, Some("scanned"))
            .await
            .unwrap();
        let task = store.repo_task("a/one").await.unwrap().unwrap();
        assert_eq!(task.status, "done");
        assert_eq!(task.note.as_deref(), Some("scanned"));
        assert!(task.last_analyzed_at.is_some());
    }

    #[tokio::test]
    async fn test_queue_stats_counts_by_status() {
        let store = Store::in_memory().await.unwrap();
        store.enqueue_repo("a/one", None).await.unwrap();
        store.enqueue_repo("b/two", None).await.unwrap();
        store.enqueue_repo("c/three", None).await.unwrap();
        store.mark_repo_status("b/two", RepoStatus::Done, None).await.unwrap();
        store.mark_repo_status("c/three", RepoStatus::Failed, None).await.unwrap();

        let stats = store.queue_stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.done, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_top_alive_orders_by_score_and_filters_country() {
        let store = Store::in_memory().await.unwrap();
        let fast = ProxyCandidate::new(ProxyType::Socks5, "1.1.1.1", 1080, "s");
        let slow = ProxyCandidate::new(ProxyType::Http, "2.2.2.2", 8080, "s");
        let dead = ProxyCandidate::new(ProxyType::Http, "3.3.3.3", 8080, "s");

        store.upsert_observation(&fast, Some("US"), true, Some(50.0)).await.unwrap();
        store.upsert_observation(&slow, Some("DE"), true, Some(800.0)).await.unwrap();
        store.upsert_observation(&dead, Some("US"), false, None).await.unwrap();

        let top = store.top_alive(10, None).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].host, "1.1.1.1");
        assert_eq!(top[1].host, "2.2.2.2");

        let us_only = store
            .top_alive(10, Some(&["US".to_string()]))
            .await
            .unwrap();
        assert_eq!(us_only.len(), 1);
        assert_eq!(us_only[0].host, "1.1.1.1");
    }

    #[tokio::test]
    async fn test_dashboard_stats_aggregates() {
        let store = Store::in_memory().await.unwrap();
        let alive = ProxyCandidate::new(ProxyType::Http, "1.1.1.1", 80, "s");
        let dead = ProxyCandidate::new(ProxyType::Http, "2.2.2.2", 80, "s");
        store.upsert_observation(&alive, Some("US"), true, Some(50.0)).await.unwrap();
        store.upsert_observation(&dead, None, false, None).await.unwrap();
        store.enqueue_repo("a/one", None).await.unwrap();
        store.record_run(3, 10, 2, 1).await.unwrap();

        let stats = store.dashboard_stats().await.unwrap();
        assert_eq!(stats.total_proxies, 2);
        assert_eq!(stats.alive_proxies, 1);
        assert_eq!(stats.countries_top.len(), 1);
        assert_eq!(stats.countries_top[0].country, "US");
        assert_eq!(stats.countries_top[0].count, 1);
        assert_eq!(stats.queue.pending, 1);
        assert_eq!(stats.observations_24h, 2);

        let run = stats.latest_run.unwrap();
        assert_eq!(run.raw_sources, 3);
        assert_eq!(run.candidates, 10);
        assert_eq!(run.saved, 2);
        assert_eq!(run.alive, 1);
    }
}
