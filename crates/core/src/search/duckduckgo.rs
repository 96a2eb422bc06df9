//! DuckDuckGo tiers: the keyless instant-answer API and, as the last resort
//! of the whole chain, a scrape of the HTML results page.

use super::{SearchHit, SearchTier};
use anyhow::{Result, bail};
use async_trait::async_trait;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const INSTANT_ANSWER_URL: &str = "https://api.duckduckgo.com/";
const HTML_RESULTS_URL: &str = "https://html.duckduckgo.com/html/";

/// Browser identities rotated across scrape requests.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Entry {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

fn collect_topics(topics: Vec<RelatedTopic>, hits: &mut Vec<SearchHit>) {
    for topic in topics {
        match topic {
            RelatedTopic::Entry { text, first_url } if !text.is_empty() => {
                let title = text.split(" - ").next().unwrap_or(&text).to_string();
                hits.push(SearchHit {
                    title,
                    snippet: text,
                    url: first_url,
                });
            }
            RelatedTopic::Entry { .. } => {}
            RelatedTopic::Group { topics } => collect_topics(topics, hits),
        }
    }
}

fn instant_answer_hits(answer: InstantAnswer) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    if !answer.abstract_text.is_empty() {
        hits.push(SearchHit {
            title: answer.heading,
            snippet: answer.abstract_text,
            url: answer.abstract_url,
        });
    }
    collect_topics(answer.related_topics, &mut hits);
    hits
}

/// Keyless DuckDuckGo instant-answer API.
pub struct InstantAnswerTier {
    http: reqwest::Client,
}

impl InstantAnswerTier {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SearchTier for InstantAnswerTier {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let answer: InstantAnswer = self
            .http
            .get(INSTANT_ANSWER_URL)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let mut hits = instant_answer_hits(answer);
        hits.truncate(max_results);
        Ok(hits)
    }
}

/// Scrapes the DuckDuckGo HTML results page.
///
/// Requests are spaced by a random delay and carry a random browser
/// User-Agent. A page without result rows is a failure.
pub struct HtmlScrapeTier {
    http: reqwest::Client,
}

impl HtmlScrapeTier {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SearchTier for HtmlScrapeTier {
    fn name(&self) -> &str {
        "html_scrape"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let (delay, user_agent) = {
            let mut rng = rand::rng();
            let delay = Duration::from_millis(rng.random_range(500..1500));
            let user_agent = USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0]);
            (delay, user_agent)
        };
        debug!(?delay, "Waiting before scraping search results");
        tokio::time::sleep(delay).await;

        let html = self
            .http
            .get(HTML_RESULTS_URL)
            .query(&[("q", query)])
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let hits = parse_result_rows(&html, max_results);
        if hits.is_empty() {
            bail!("no result rows in page");
        }
        Ok(hits)
    }
}

/// Extracts up to `max_results` result rows from a DuckDuckGo HTML page.
pub fn parse_result_rows(html: &str, max_results: usize) -> Vec<SearchHit> {
    let doc = scraper::Html::parse_document(html);
    let row_sel = scraper::Selector::parse("div.result").unwrap_or_else(|_| unreachable!());
    let link_sel = scraper::Selector::parse("a.result__a").unwrap_or_else(|_| unreachable!());
    let snippet_sel =
        scraper::Selector::parse(".result__snippet").unwrap_or_else(|_| unreachable!());

    doc.select(&row_sel)
        .filter_map(|row| {
            let link = row.select(&link_sel).next()?;
            let title = squash_whitespace(&link.text().collect::<String>());
            let href = link.value().attr("href")?;
            let snippet = row
                .select(&snippet_sel)
                .next()
                .map(|s| squash_whitespace(&s.text().collect::<String>()))
                .unwrap_or_default();
            (!title.is_empty()).then(|| SearchHit {
                title,
                snippet,
                url: resolve_redirect(href),
            })
        })
        .take(max_results)
        .collect()
}

fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Unwraps DuckDuckGo's `/l/?uddg=<target>` redirect links.
fn resolve_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    reqwest::Url::parse(&absolute)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "uddg")
                .map(|(_, target)| target.into_owned())
        })
        .unwrap_or(absolute)
}
