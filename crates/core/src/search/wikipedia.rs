//! Encyclopedic lookup against Wikipedia.
//!
//! Review-site vocabulary is stripped from the query before searching since it
//! only hurts title matching. A disambiguation page resolves to its first
//! listed article; a missing page or an unresolvable disambiguation is a tier
//! failure.

use super::{SearchHit, SearchTier};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::debug;

const API_URL: &str = "https://en.wikipedia.org/w/api.php";
const SUMMARY_URL: &str = "https://en.wikipedia.org/api/rest_v1/page/summary/";

static REVIEW_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(imdb|rotten\s+tomatoes|metacritic|ratings?|reviews?|scores?)\b")
        .unwrap_or_else(|_| unreachable!())
});

/// Removes review and rating vocabulary from a query.
pub fn clean_query(query: &str) -> String {
    REVIEW_KEYWORDS
        .replace_all(query, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Deserialize)]
struct PageSummary {
    #[serde(rename = "type", default)]
    kind: String,
    title: String,
    #[serde(default)]
    extract: String,
    content_urls: Option<ContentUrls>,
}

#[derive(Deserialize)]
struct ContentUrls {
    desktop: PageUrl,
}

#[derive(Deserialize)]
struct PageUrl {
    page: String,
}

#[derive(Deserialize)]
struct LinksResponse {
    query: LinksQuery,
}

#[derive(Deserialize)]
struct LinksQuery {
    #[serde(default)]
    pages: Vec<LinksPage>,
}

#[derive(Deserialize)]
struct LinksPage {
    #[serde(default)]
    links: Vec<LinkTitle>,
}

#[derive(Deserialize)]
struct LinkTitle {
    title: String,
}

pub struct WikipediaTier {
    http: reqwest::Client,
}

impl WikipediaTier {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn best_title(&self, query: &str) -> Result<String> {
        // opensearch answers [query, [titles], [descriptions], [urls]]
        let (_, titles, _, _): (String, Vec<String>, Vec<String>, Vec<String>) = self
            .http
            .get(API_URL)
            .query(&[
                ("action", "opensearch"),
                ("search", query),
                ("limit", "1"),
                ("namespace", "0"),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("invalid opensearch response")?;
        titles
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("page not found"))
    }

    async fn summary(&self, title: &str) -> Result<PageSummary> {
        let mut url = reqwest::Url::parse(SUMMARY_URL)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("summary URL cannot be a base"))?
            .pop_if_empty()
            .push(&title.replace(' ', "_"));
        let response = self.http.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            bail!("page '{}' not found", title);
        }
        Ok(response.error_for_status()?.json().await?)
    }

    async fn first_listed_option(&self, title: &str) -> Result<String> {
        let response: LinksResponse = self
            .http
            .get(API_URL)
            .query(&[
                ("action", "query"),
                ("prop", "links"),
                ("titles", title),
                ("plnamespace", "0"),
                ("pllimit", "1"),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("invalid links response")?;
        response
            .query
            .pages
            .into_iter()
            .flat_map(|page| page.links)
            .map(|link| link.title)
            .next()
            .ok_or_else(|| anyhow!("disambiguation for '{}' lists no options", title))
    }
}

#[async_trait]
impl SearchTier for WikipediaTier {
    fn name(&self) -> &str {
        "wikipedia"
    }

    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        let cleaned = clean_query(query);
        if cleaned.is_empty() {
            bail!("query is empty after cleaning");
        }

        let title = self.best_title(&cleaned).await?;
        let mut summary = self.summary(&title).await?;
        if summary.kind == "disambiguation" {
            let option = self.first_listed_option(&summary.title).await?;
            debug!(from = %summary.title, to = %option, "Resolved disambiguation page");
            summary = self.summary(&option).await?;
            if summary.kind == "disambiguation" {
                bail!("disambiguation for '{}' could not be resolved", title);
            }
        }
        if summary.extract.trim().is_empty() {
            bail!("page '{}' has no summary", summary.title);
        }

        let url = summary
            .content_urls
            .map(|urls| urls.desktop.page)
            .unwrap_or_else(|| {
                format!("https://en.wikipedia.org/wiki/{}", summary.title.replace(' ', "_"))
            });
        Ok(vec![SearchHit {
            title: summary.title,
            snippet: summary.extract,
            url,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_query_strips_review_vocabulary() {
        assert_eq!(clean_query("Inception IMDb rating"), "Inception");
        assert_eq!(clean_query("Oppenheimer rotten tomatoes score"), "Oppenheimer");
        assert_eq!(clean_query("Dune reviews and ratings"), "Dune and");
        assert_eq!(clean_query("capital of France"), "capital of France");
    }

    #[test]
    fn test_summary_deserializes_disambiguation_kind() {
        let summary: PageSummary = serde_json::from_str(
            r#"{"type": "disambiguation", "title": "Mercury", "extract": "Mercury may refer to:"}"#,
        )
        .unwrap();
        assert_eq!(summary.kind, "disambiguation");
        assert!(summary.content_urls.is_none());
    }
}
