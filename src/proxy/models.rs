//! Proxy candidate data models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Proxy protocol enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
    /// Telegram MTProto; validated by TCP reachability only
    Mtproto,
    /// Shadowsocks; validated by TCP reachability only
    Ss,
    /// VMess; validated by TCP reachability only
    Vmess,
}

impl ProxyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::Http => "http",
            ProxyType::Https => "https",
            ProxyType::Socks4 => "socks4",
            ProxyType::Socks5 => "socks5",
            ProxyType::Mtproto => "mtproto",
            ProxyType::Ss => "ss",
            ProxyType::Vmess => "vmess",
        }
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "https" => Ok(ProxyType::Https),
            "socks4" => Ok(ProxyType::Socks4),
            "socks5" => Ok(ProxyType::Socks5),
            "mtproto" => Ok(ProxyType::Mtproto),
            "ss" => Ok(ProxyType::Ss),
            "vmess" => Ok(ProxyType::Vmess),
            other => Err(anyhow::anyhow!("unknown proxy type: {other}")),
        }
    }
}

/// An unvalidated proxy endpoint extracted from raw text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCandidate {
    pub proxy_type: ProxyType,
    pub host: String,
    pub port: u16,
    /// Where the candidate was found (URL or other stable source id)
    pub source: String,
}

impl ProxyCandidate {
    pub fn new(proxy_type: ProxyType, host: impl Into<String>, port: u16, source: impl Into<String>) -> Self {
        Self {
            proxy_type,
            host: host.into(),
            port,
            source: source.into(),
        }
    }

    /// Identity key for deduplication: the (type, host, port) triple.
    pub fn key(&self) -> (ProxyType, &str, u16) {
        (self.proxy_type, self.host.as_str(), self.port)
    }

    /// Proxy URL string, e.g. `socks5://1.2.3.4:1080`
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.proxy_type, self.host, self.port)
    }
}

impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// Result of probing a single candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub candidate: ProxyCandidate,
    pub is_alive: bool,
    pub latency_ms: Option<f64>,
}

impl ValidationOutcome {
    pub fn alive(candidate: ProxyCandidate, latency_ms: f64) -> Self {
        Self {
            candidate,
            is_alive: true,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn dead(candidate: ProxyCandidate) -> Self {
        Self {
            candidate,
            is_alive: false,
            latency_ms: None,
        }
    }
}
