//! Cascading Web Search
//!
//! A query is resolved by walking an ordered chain of search tiers and
//! stopping at the first one that produces results. Each tier reports a
//! tagged success or failure; failures are kept so that, when the whole chain
//! is exhausted, the caller receives one message listing every reason in
//! priority order. Resolution never fails with an error: exhaustion is a
//! regular `SearchOutcome`.
//!
//! Default chain, highest priority first:
//! 1. `weather` - current conditions for weather questions.
//! 2. `tavily` - API-key-backed search, with a legacy-protocol retry.
//! 3. `duckduckgo` - keyless instant-answer API.
//! 4. `wikipedia` - encyclopedic summary lookup.
//! 5. `searxng` - self-hosted metasearch, when configured.
//! 6. `html_scrape` - parsed search result page as last resort.

pub mod duckduckgo;
pub mod searxng;
pub mod tavily;
pub mod weather;
pub mod wikipedia;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{info, warn};

/// One normalized search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// Why a single tier produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{provider}: {reason}")]
pub struct TierFailure {
    pub provider: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found {
        provider: String,
        hits: Vec<SearchHit>,
    },
    /// Every tier failed; reasons are in chain order.
    Exhausted { failures: Vec<TierFailure> },
}

impl SearchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found { .. })
    }

    /// Renders the outcome as the text handed back to the model.
    pub fn to_text(&self) -> String {
        match self {
            SearchOutcome::Found { provider, hits } => {
                let mut text = format!("Search Results ({}):\n\n", provider);
                for (i, hit) in hits.iter().enumerate() {
                    let _ = write!(
                        text,
                        "{}. {}\n   {}\n   Source: {}\n\n",
                        i + 1,
                        hit.title,
                        hit.snippet,
                        hit.url
                    );
                }
                text
            }
            SearchOutcome::Exhausted { failures } => {
                let reasons: Vec<String> = failures.iter().map(ToString::to_string).collect();
                format!("All search providers failed: {}", reasons.join("; "))
            }
        }
    }
}

/// A single backend in the fallback chain.
#[async_trait]
pub trait SearchTier: Send + Sync {
    /// Stable identifier used in outcomes and logs.
    fn name(&self) -> &str;

    /// Returns hits for `query`, or an error describing why this tier cannot answer.
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<SearchHit>>;
}

/// Credentials and endpoints for the default tier chain.
#[derive(Debug, Clone, Default)]
pub struct SearchSettings {
    pub tavily_api_key: Option<String>,
    pub searxng_url: Option<String>,
}

/// Ordered, short-circuiting chain of search tiers.
pub struct SearchResolver {
    tiers: Vec<Box<dyn SearchTier>>,
}

impl SearchResolver {
    pub fn new(tiers: Vec<Box<dyn SearchTier>>) -> Self {
        Self { tiers }
    }

    /// Builds the standard six-tier chain over a shared HTTP client.
    pub fn standard(http: reqwest::Client, settings: SearchSettings) -> Self {
        Self::new(vec![
            Box::new(weather::WeatherTier::new(weather::OpenMeteo::new(http.clone()))),
            Box::new(tavily::TavilyTier::new(http.clone(), settings.tavily_api_key)),
            Box::new(duckduckgo::InstantAnswerTier::new(http.clone())),
            Box::new(wikipedia::WikipediaTier::new(http.clone())),
            Box::new(searxng::SearxngTier::new(http.clone(), settings.searxng_url)),
            Box::new(duckduckgo::HtmlScrapeTier::new(http)),
        ])
    }

    /// Builds the HTTP client shared by the standard tiers.
    pub fn http_client() -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("jarvis/", env!("CARGO_PKG_VERSION")))
            .build()
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|tier| tier.name()).collect()
    }

    /// Walks the chain until a tier returns at least one hit.
    pub async fn resolve(&self, query: &str, max_results: usize) -> SearchOutcome {
        let mut failures = Vec::new();
        for tier in &self.tiers {
            let provider = tier.name();
            let reason = match tier.search(query, max_results).await {
                Ok(mut hits) if !hits.is_empty() => {
                    hits.truncate(max_results.max(1));
                    info!(provider, hits = hits.len(), "Search tier succeeded");
                    return SearchOutcome::Found {
                        provider: provider.to_string(),
                        hits,
                    };
                }
                Ok(_) => "no results".to_string(),
                Err(e) => format!("{:#}", e),
            };
            warn!(provider, %reason, "Search tier failed");
            failures.push(TierFailure {
                provider: provider.to_string(),
                reason,
            });
        }
        SearchOutcome::Exhausted { failures }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A tier with a fixed answer that counts how often it was consulted.
    pub(crate) struct StubTier {
        pub name: &'static str,
        pub hits: Option<Vec<SearchHit>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl StubTier {
        pub(crate) fn failing(name: &'static str) -> Self {
            Self {
                name,
                hits: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn answering(name: &'static str, titles: &[&str]) -> Self {
            let hits = titles
                .iter()
                .map(|t| SearchHit {
                    title: t.to_string(),
                    snippet: format!("about {}", t),
                    url: format!("https://example.com/{}", t),
                })
                .collect();
            Self {
                name,
                hits: Some(hits),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl SearchTier for StubTier {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, _query: &str, _max: usize) -> anyhow::Result<Vec<SearchHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.hits
                .clone()
                .ok_or_else(|| anyhow!("{} unavailable", self.name))
        }
    }

    #[tokio::test]
    async fn test_exhausted_chain_reports_every_reason_in_order() {
        let resolver = SearchResolver::new(vec![
            Box::new(StubTier::failing("weather")),
            Box::new(StubTier::failing("tavily")),
            Box::new(StubTier::answering("duckduckgo", &[])),
            Box::new(StubTier::failing("wikipedia")),
            Box::new(StubTier::failing("searxng")),
            Box::new(StubTier::failing("html_scrape")),
        ]);

        let outcome = resolver.resolve("capital of France", 3).await;
        assert_eq!(
            outcome.to_text(),
            "All search providers failed: weather: weather unavailable; \
             tavily: tavily unavailable; duckduckgo: no results; \
             wikipedia: wikipedia unavailable; searxng: searxng unavailable; \
             html_scrape: html_scrape unavailable"
        );
    }

    #[tokio::test]
    async fn test_first_successful_tier_short_circuits() {
        let later = StubTier::answering("later", &["b"]);
        let later_calls = later.calls.clone();
        let resolver = SearchResolver::new(vec![
            Box::new(StubTier::failing("first")),
            Box::new(StubTier::answering("second", &["a1", "a2", "a3", "a4"])),
            Box::new(later),
        ]);

        match resolver.resolve("anything", 2).await {
            SearchOutcome::Found { provider, hits } => {
                assert_eq!(provider, "second");
                assert_eq!(hits.len(), 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_found_text_format() {
        let outcome = SearchOutcome::Found {
            provider: "duckduckgo".to_string(),
            hits: vec![SearchHit {
                title: "Paris".to_string(),
                snippet: "Capital of France".to_string(),
                url: "https://en.wikipedia.org/wiki/Paris".to_string(),
            }],
        };
        assert_eq!(
            outcome.to_text(),
            "Search Results (duckduckgo):\n\n1. Paris\n   Capital of France\n   Source: https://en.wikipedia.org/wiki/Paris\n\n"
        );
    }

    #[test]
    fn test_standard_chain_order() {
        let http = reqwest::Client::new();
        let resolver = SearchResolver::standard(http, SearchSettings::default());
        assert_eq!(
            resolver.tier_names(),
            vec!["weather", "tavily", "duckduckgo", "wikipedia", "searxng", "html_scrape"]
        );
    }
}
