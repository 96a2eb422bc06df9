//! Tavily search tier (API key required).

use super::{SearchHit, SearchTier};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";
/// Tavily is always asked for this many results; the resolver trims to the caller's limit.
const RESULT_COUNT: u32 = 5;

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

pub struct TavilyTier {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl TavilyTier {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        Self { http, api_key }
    }

    /// Current protocol: bearer-authenticated JSON request.
    async fn search_bearer(&self, key: &str, query: &str) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({
            "query": query,
            "max_results": RESULT_COUNT,
            "search_depth": "basic",
            "include_answer": false,
        });
        let response = self
            .http
            .post(TAVILY_SEARCH_URL)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        parse_response(response).await
    }

    /// Legacy protocol: the key travels in the request body.
    async fn search_legacy(&self, key: &str, query: &str) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({
            "api_key": key,
            "query": query,
            "max_results": RESULT_COUNT,
        });
        let response = self.http.post(TAVILY_SEARCH_URL).json(&body).send().await?;
        parse_response(response).await
    }
}

async fn parse_response(response: reqwest::Response) -> Result<Vec<SearchHit>> {
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        bail!("HTTP {}: {}", status, detail.chars().take(200).collect::<String>());
    }
    let parsed: TavilyResponse = response.json().await?;
    Ok(parsed
        .results
        .into_iter()
        .map(|r| SearchHit {
            title: r.title,
            snippet: r.content,
            url: r.url,
        })
        .collect())
}

#[async_trait]
impl SearchTier for TavilyTier {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("TAVILY_API_KEY not configured"))?;

        match self.search_bearer(key, query).await {
            Ok(hits) if !hits.is_empty() => Ok(hits),
            first => {
                let first_reason = match first {
                    Ok(_) => "no results".to_string(),
                    Err(e) => e.to_string(),
                };
                warn!(reason = %first_reason, "Tavily request failed, retrying with legacy protocol");
                self.search_legacy(key, query)
                    .await
                    .map_err(|e| anyhow!("{}; legacy retry: {}", first_reason, e))
            }
        }
    }
}
