//! General web search through a SearXNG-compatible JSON endpoint.

use super::{SearchHit, SearchTier};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Deserialize)]
struct SearxngResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

pub struct SearxngTier {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl SearxngTier {
    pub fn new(http: reqwest::Client, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        Self { http, base_url }
    }
}

#[async_trait]
impl SearchTier for SearxngTier {
    fn name(&self) -> &str {
        "searxng"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| anyhow!("not configured"))?;
        let response: SearxngResponse = self
            .http
            .get(format!("{}/search", base))
            .query(&[("q", query), ("format", "json")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response
            .results
            .into_iter()
            .filter(|r| !r.title.is_empty())
            .take(max_results)
            .map(|r| SearchHit {
                title: r.title,
                snippet: r.content,
                url: r.url,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_endpoint_fails() {
        let tier = SearxngTier::new(reqwest::Client::new(), Some(" ".to_string()));
        let err = tier.search("rust", 3).await.unwrap_err();
        assert_eq!(err.to_string(), "not configured");
    }
}
