//! Concurrent proxy liveness validation
//!
//! Routes each candidate to a protocol-appropriate probe: HTTP(S) and
//! SOCKS proxies are exercised end-to-end against public IP echo
//! endpoints, opaque protocols (MTProto, Shadowsocks, VMess) get a bare
//! TCP reachability check. Check failures never propagate; they become
//! dead outcomes.

use crate::proxy::models::{ProxyCandidate, ProxyType, ValidationOutcome};
use crate::Result;
use futures::future;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Proxy as ReqwestProxy};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;

/// Default timeout for a single candidate check in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 4;

/// Default number of concurrent checks
const DEFAULT_CONCURRENCY: usize = 100;

/// Hard ceiling on concurrent checks regardless of configuration.
/// Keeps one oversized request batch from starving the runtime.
const MAX_CONCURRENCY_CEILING: usize = 512;

/// IP echo services raced per HTTP/SOCKS check; the first response
/// below 500 wins. The list length bounds the per-candidate fan-out.
const ECHO_ENDPOINTS: [&str; 3] = [
    "http://httpbin.org/ip",
    "https://api.ipify.org",
    "https://icanhazip.com",
];

/// Configuration for the proxy validator
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Timeout applied to each candidate check
    pub timeout: Duration,
    /// Requested number of concurrent checks (clamped internally)
    pub max_concurrency: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ValidatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }
}

/// Protocol-routed concurrent liveness prober
#[derive(Debug, Clone, Default)]
pub struct ProxyValidator {
    config: ValidatorConfig,
}

impl ProxyValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Concurrency actually used: requested value clamped to the ceiling.
    pub fn effective_concurrency(&self) -> usize {
        self.config.max_concurrency.clamp(1, MAX_CONCURRENCY_CEILING)
    }

    /// Check all candidates concurrently.
    ///
    /// Returns one outcome per candidate in input order. Concurrency is
    /// bounded by [`Self::effective_concurrency`]; every check yields to
    /// the scheduler once before probing so a large batch cannot
    /// monopolize the runtime.
    pub async fn validate(&self, candidates: Vec<ProxyCandidate>) -> Vec<ValidationOutcome> {
        let limit = self.effective_concurrency();
        let semaphore = Arc::new(Semaphore::new(limit));

        stream::iter(candidates)
            .map(|candidate| {
                let sem = Arc::clone(&semaphore);
                let validator = self.clone();
                async move {
                    // Only fails if the semaphore is closed, which cannot
                    // happen while this Arc is alive.
                    let _permit = sem.acquire().await.expect("Semaphore closed unexpectedly");
                    tokio::task::yield_now().await;
                    validator.check(&candidate).await
                }
            })
            .buffered(limit)
            .collect::<Vec<_>>()
            .await
    }

    /// Check a single candidate, routed by protocol.
    pub async fn check(&self, candidate: &ProxyCandidate) -> ValidationOutcome {
        match candidate.proxy_type {
            ProxyType::Http | ProxyType::Https | ProxyType::Socks4 | ProxyType::Socks5 => {
                self.check_proxied(candidate).await
            }
            ProxyType::Mtproto | ProxyType::Ss | ProxyType::Vmess => {
                self.check_tcp_only(candidate).await
            }
        }
    }

    /// HTTP/SOCKS path: GET the echo endpoints through the candidate,
    /// racing them concurrently; the first status < 500 proves the
    /// candidate forwards traffic.
    async fn check_proxied(&self, candidate: &ProxyCandidate) -> ValidationOutcome {
        let client = match self.build_client(candidate) {
            Ok(client) => client,
            Err(_) => return ValidationOutcome::dead(candidate.clone()),
        };

        let start = Instant::now();
        let race = ECHO_ENDPOINTS.iter().map(|url| {
            let client = client.clone();
            Box::pin(async move {
                let response = client.get(*url).send().await?;
                if response.status().as_u16() < 500 {
                    Ok(())
                } else {
                    anyhow::bail!("echo endpoint status: {}", response.status())
                }
            })
        });

        match tokio::time::timeout(self.config.timeout, future::select_ok(race)).await {
            Ok(Ok(_)) => {
                ValidationOutcome::alive(candidate.clone(), start.elapsed().as_secs_f64() * 1000.0)
            }
            _ => ValidationOutcome::dead(candidate.clone()),
        }
    }

    /// Opaque-protocol path: TCP reachability only, no handshake.
    async fn check_tcp_only(&self, candidate: &ProxyCandidate) -> ValidationOutcome {
        let start = Instant::now();
        let addr = (candidate.host.as_str(), candidate.port);

        match tokio::time::timeout(self.config.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => {
                ValidationOutcome::alive(candidate.clone(), start.elapsed().as_secs_f64() * 1000.0)
            }
            _ => ValidationOutcome::dead(candidate.clone()),
        }
    }

    /// Build a reqwest client bound to the candidate proxy.
    fn build_client(&self, candidate: &ProxyCandidate) -> Result<Client> {
        let proxy_url = candidate.url();

        let proxy = match candidate.proxy_type {
            ProxyType::Http | ProxyType::Https => ReqwestProxy::http(&proxy_url)?,
            _ => ReqwestProxy::all(&proxy_url)?,
        };

        let client = Client::builder()
            .proxy(proxy)
            .timeout(self.config.timeout)
            .build()?;

        Ok(client)
    }
}
