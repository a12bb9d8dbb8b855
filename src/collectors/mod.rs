//! Collectors producing raw text for extraction
//!
//! Every source of candidate text implements [`Collector`]: bulk URL
//! lists, the GitHub crawler, and whatever gets added next. Collectors
//! drop individual item failures silently; only collector-level fatal
//! faults reach the orchestrator.

use async_trait::async_trait;

use crate::Result;

pub mod github;
pub mod url_list;

pub use github::{GitHubCollector, GitHubCollectorConfig};
pub use url_list::UrlListCollector;

/// One fetched document: a stable source identifier plus raw text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// Canonical URL or other stable identifier of the source
    pub source: String,
    /// Raw text body, format unknown
    pub text: String,
}

impl RawDocument {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// A source of raw candidate text
#[async_trait]
pub trait Collector: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Gather raw documents. Partial failures are dropped; an `Err`
    /// means the whole collector failed and the cycle degrades.
    async fn collect(&self) -> Result<Vec<RawDocument>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticCollector(Vec<RawDocument>);

    #[async_trait]
    impl Collector for StaticCollector {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn collect(&self) -> Result<Vec<RawDocument>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_collector_trait_objects() {
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(StaticCollector(vec![RawDocument::new("a", "1.2.3.4:80")])),
            Box::new(StaticCollector(vec![])),
        ];
        let mut docs = Vec::new();
        for collector in &collectors {
            docs.extend(collector.collect().await.unwrap());
        }
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "a");
    }
}
