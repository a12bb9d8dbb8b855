//! Persisted row types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Catalog row for one known proxy endpoint.
/// Unique on (proxy_type, host, port); `success_rate` and `score` are
/// derived by the store and never set directly.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub id: i64,
    pub proxy_type: String,
    pub host: String,
    pub port: u16,
    pub country: Option<String>,
    pub source: String,
    pub is_alive: bool,
    pub latency_ms: Option<f64>,
    pub success_rate: f64,
    pub score: f64,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only validation event
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub id: i64,
    pub proxy_type: String,
    pub host: String,
    pub port: u16,
    pub is_alive: bool,
    pub latency_ms: Option<f64>,
    pub source: String,
    pub checked_at: DateTime<Utc>,
}

/// Repository scan task states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepoStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl RepoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoStatus::Pending => "pending",
            RepoStatus::Processing => "processing",
            RepoStatus::Done => "done",
            RepoStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RepoStatus::Pending),
            "processing" => Ok(RepoStatus::Processing),
            "done" => Ok(RepoStatus::Done),
            "failed" => Ok(RepoStatus::Failed),
            other => Err(anyhow::anyhow!("unknown repo status: {other}")),
        }
    }
}

/// Work-queue row for one repository awaiting or past a deep scan
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RepoTask {
    pub id: i64,
    pub repo_full_name: String,
    pub status: String,
    pub note: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_analyzed_at: Option<DateTime<Utc>>,
}

/// Audit snapshot appended after each completed pipeline cycle
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: i64,
    pub raw_sources: i64,
    pub candidates: i64,
    pub saved: i64,
    pub alive: i64,
    pub created_at: DateTime<Utc>,
}

/// Result of an enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Name was new; a pending task was created
    Queued,
    /// A live (pending/processing) or failed task already exists
    AlreadyQueued,
    /// The repository was already analyzed to completion
    AlreadyAnalyzed,
}

impl EnqueueOutcome {
    /// Whether a new task row was created
    pub fn created(&self) -> bool {
        matches!(self, EnqueueOutcome::Queued)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            EnqueueOutcome::Queued => "queued",
            EnqueueOutcome::AlreadyQueued => "already_queued",
            EnqueueOutcome::AlreadyAnalyzed => "already_analyzed",
        }
    }
}

/// Per-status task counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub done: i64,
    pub failed: i64,
}

/// Alive-proxy count for one country
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CountryCount {
    pub country: String,
    pub count: i64,
}

/// Aggregate snapshot for dashboards and reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_proxies: i64,
    pub alive_proxies: i64,
    pub countries_top: Vec<CountryCount>,
    pub queue: QueueStats,
    pub latest_run: Option<PipelineRun>,
    pub observations_24h: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_status_roundtrip() {
        for s in ["pending", "processing", "done", "failed"] {
            let status: RepoStatus = s.parse().unwrap();
            assert_eq!(status.as_str(), s);
        }
        assert!("unknown".parse::<RepoStatus>().is_err());
    }

    #[test]
    fn test_enqueue_outcome_reasons() {
        assert!(EnqueueOutcome::Queued.created());
        assert!(!EnqueueOutcome::AlreadyQueued.created());
        assert!(!EnqueueOutcome::AlreadyAnalyzed.created());
        assert_eq!(EnqueueOutcome::Queued.reason(), "queued");
        assert_eq!(EnqueueOutcome::AlreadyQueued.reason(), "already_queued");
        assert_eq!(EnqueueOutcome::AlreadyAnalyzed.reason(), "already_analyzed");
    }
}
