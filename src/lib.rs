//! Proxy Harvest - Proxy Discovery and Scoring Pipeline
//!
//! Harvests proxy endpoints (HTTP/HTTPS/SOCKS4/SOCKS5/Shadowsocks/MTProto)
//! from public code repositories and bulk URL lists, validates their
//! liveness concurrently and maintains a scored catalog in SQLite.

pub mod collectors;
pub mod config;
pub mod database;
pub mod pipeline;
pub mod proxy;
pub mod retry;

pub use config::Settings;
pub use database::Store;
pub use pipeline::{Pipeline, RunStats};
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
