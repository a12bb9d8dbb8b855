//! Bulk URL list collector

use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use reqwest::Client;

use crate::collectors::{Collector, RawDocument};
use crate::retry::retry_with_backoff;
use crate::Result;

/// Timeout for fetching one source URL
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Attempts per URL before giving up on it for this cycle
const FETCH_ATTEMPTS: u32 = 3;

/// Backoff base delay between attempts
const FETCH_BASE_DELAY: Duration = Duration::from_secs(1);

/// Fetches a configured list of URLs in parallel and returns their
/// bodies verbatim. URLs that keep failing are skipped for the cycle.
pub struct UrlListCollector {
    urls: Vec<String>,
    client: Client,
}

impl UrlListCollector {
    pub fn new(urls: Vec<String>) -> Result<Self> {
        let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { urls, client })
    }

    async fn fetch_one(&self, url: &str) -> Option<RawDocument> {
        let client = &self.client;
        let response = retry_with_backoff(FETCH_ATTEMPTS, FETCH_BASE_DELAY, || async move {
            Ok(client.get(url).send().await?)
        })
        .await;

        match response {
            Ok(resp) if resp.status().as_u16() == 200 => {
                let text = resp.text().await.ok()?;
                if text.is_empty() {
                    None
                } else {
                    Some(RawDocument::new(url, text))
                }
            }
            Ok(resp) => {
                tracing::debug!(url, status = resp.status().as_u16(), "source URL non-200");
                None
            }
            Err(err) => {
                tracing::warn!(url, error = %err, "source URL failed after all attempts");
                None
            }
        }
    }
}

#[async_trait]
impl Collector for UrlListCollector {
    fn name(&self) -> &'static str {
        "url-list"
    }

    async fn collect(&self) -> Result<Vec<RawDocument>> {
        if self.urls.is_empty() {
            return Ok(Vec::new());
        }

        let fetched = future::join_all(self.urls.iter().map(|url| self.fetch_one(url))).await;
        Ok(fetched.into_iter().flatten().collect())
    }
}
