//! Country resolution for proxy hosts
//!
//! Resolves an IP address to an ISO 3166-1 alpha-2 country code, best
//! effort. Prefers a local MMDB database when configured; otherwise
//! falls back to a public HTTP lookup. Results (including failures) are
//! memoized for the lifetime of the resolver, which the pipeline scopes
//! to one run.

use maxminddb::{geoip2, Reader};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Timeout for one HTTP geo lookup
const GEO_HTTP_TIMEOUT: Duration = Duration::from_secs(3);

/// Attempts per HTTP lookup (429 and transport errors are retried)
const GEO_MAX_ATTEMPTS: u32 = 2;

/// Best-effort IP-to-country resolver with per-run memoization
pub struct CountryResolver {
    reader: Option<Arc<Reader<Vec<u8>>>>,
    client: reqwest::Client,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl CountryResolver {
    /// Create a resolver. A missing or unreadable MMDB file downgrades
    /// to the HTTP fallback rather than failing.
    pub fn new(mmdb_path: Option<&str>) -> Self {
        let reader = mmdb_path.and_then(|path| match Reader::open_readfile(Path::new(path)) {
            Ok(reader) => Some(Arc::new(reader)),
            Err(err) => {
                tracing::warn!(path, error = %err, "cannot open MMDB, using HTTP geo lookup");
                None
            }
        });

        Self {
            reader,
            client: reqwest::Client::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the country code for an IP address string.
    ///
    /// Returns `None` for non-IP hosts and for any lookup failure; both
    /// are cached so hopeless addresses are asked about only once.
    pub async fn country_of(&self, ip: &str) -> Option<String> {
        if let Some(cached) = self.cache.lock().expect("geo cache poisoned").get(ip) {
            return cached.clone();
        }

        let result = match ip.parse::<IpAddr>() {
            Ok(addr) => match &self.reader {
                Some(reader) => Self::lookup_mmdb(reader, addr),
                None => self.lookup_http(ip).await,
            },
            Err(_) => None,
        };

        self.cache
            .lock()
            .expect("geo cache poisoned")
            .insert(ip.to_string(), result.clone());
        result
    }

    fn lookup_mmdb(reader: &Reader<Vec<u8>>, addr: IpAddr) -> Option<String> {
        let country: Option<geoip2::Country> = reader.lookup(addr).ok()?.decode().ok()?;
        country?
            .country
            .iso_code
            .map(|code| code.to_uppercase())
    }

    async fn lookup_http(&self, ip: &str) -> Option<String> {
        let url = format!("https://ipapi.co/{ip}/country/");

        for attempt in 0..GEO_MAX_ATTEMPTS {
            let response = self
                .client
                .get(&url)
                .timeout(GEO_HTTP_TIMEOUT)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().as_u16() == 200 => {
                    let code = resp.text().await.ok()?.trim().to_uppercase();
                    return if code.len() == 2 { Some(code) } else { None };
                }
                Ok(resp) if resp.status().as_u16() == 429 => {
                    let wait = Duration::from_secs(1 << attempt);
                    tracing::warn!(ip, attempt = attempt + 1, "geo API rate limited, waiting");
                    tokio::time::sleep(wait).await;
                }
                Ok(resp) => {
                    tracing::debug!(ip, status = resp.status().as_u16(), "geo API error status");
                    return None;
                }
                Err(err) => {
                    if attempt + 1 < GEO_MAX_ATTEMPTS {
                        tracing::warn!(ip, error = %err, "geo lookup failed, retrying");
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                    } else {
                        tracing::warn!(ip, error = %err, "geo lookup attempts exhausted");
                    }
                }
            }
        }

        None
    }

    /// Seed the cache directly. Test hook and a way for callers to
    /// carry known mappings across runs.
    pub fn preload(&self, ip: &str, country: Option<String>) {
        self.cache
            .lock()
            .expect("geo cache poisoned")
            .insert(ip.to_string(), country);
    }
}
