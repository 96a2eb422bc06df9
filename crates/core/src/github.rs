//! GitHub Repository Integration
//!
//! Thin REST wrappers used by the tool router: public code search for context
//! enrichment, and the three calls that together open a single-file pull
//! request (branch, file write, pull request).

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const GITHUB_API_URL: &str = "https://api.github.com";

/// Repository write operations needed to open a pull request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryActions: Send + Sync {
    /// Creates `branch` pointing at the head of `base`.
    async fn create_branch(&self, repo: &str, branch: &str, base: &str) -> Result<()>;

    /// Creates or updates `path` on `branch` with `content`.
    async fn write_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
    ) -> Result<()>;

    /// Opens a pull request from `head` into `base` and returns its URL.
    async fn create_pull_request(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<String>;
}

/// A code search match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeHit {
    pub name: String,
    pub path: String,
    pub repository: String,
    pub html_url: String,
}

/// Read-only access to public code.
#[async_trait]
pub trait CodeSearch: Send + Sync {
    async fn search_code(&self, query: &str, max_results: usize) -> Result<Vec<CodeHit>>;

    /// Returns the decoded text of `path` in `repo`.
    async fn file_content(&self, repo: &str, path: &str) -> Result<String>;
}

/// GitHub REST v3 client.
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Deserialize)]
struct ContentEntry {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct PullRequest {
    html_url: String,
}

#[derive(Deserialize)]
struct CodeSearchResponse {
    #[serde(default)]
    items: Vec<CodeSearchItem>,
}

#[derive(Deserialize)]
struct CodeSearchItem {
    name: String,
    path: String,
    html_url: String,
    repository: CodeSearchRepository,
}

#[derive(Deserialize)]
struct CodeSearchRepository {
    full_name: String,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("jarvis/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: GITHUB_API_URL.to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json");
        match &self.token {
            Some(token) => builder.header(reqwest::header::AUTHORIZATION, format!("token {}", token)),
            None => builder,
        }
    }

    fn require_token(&self) -> Result<()> {
        self.token
            .as_ref()
            .map(|_| ())
            .ok_or_else(|| anyhow!("GITHUB_TOKEN is not configured"))
    }
}

#[async_trait]
impl RepositoryActions for GitHubClient {
    async fn create_branch(&self, repo: &str, branch: &str, base: &str) -> Result<()> {
        self.require_token()?;
        let base_ref: GitRef = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/git/ref/heads/{}", repo, base),
            )
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("base branch '{}' not found in {}", base, repo))?
            .json()
            .await?;

        self.request(reqwest::Method::POST, &format!("/repos/{}/git/refs", repo))
            .json(&serde_json::json!({
                "ref": format!("refs/heads/{}", branch),
                "sha": base_ref.object.sha,
            }))
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("could not create branch '{}'", branch))?;
        info!(%repo, %branch, "Created branch");
        Ok(())
    }

    async fn write_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
    ) -> Result<()> {
        self.require_token()?;
        let url = format!("/repos/{}/contents/{}", repo, path);

        // An existing file needs its blob SHA to be updated in place.
        let existing_sha = match self
            .request(reqwest::Method::GET, &url)
            .query(&[("ref", branch)])
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                resp.json::<ContentEntry>().await.ok().map(|entry| entry.sha)
            }
            _ => None,
        };

        let mut body = serde_json::json!({
            "message": message,
            "content": base64::engine::general_purpose::STANDARD.encode(content.as_bytes()),
            "branch": branch,
        });
        if let Some(sha) = existing_sha {
            debug!(%path, "Updating existing file");
            body["sha"] = serde_json::Value::String(sha);
        }

        self.request(reqwest::Method::PUT, &url)
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("could not write '{}'", path))?;
        info!(%repo, %path, %branch, "Wrote file");
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<String> {
        self.require_token()?;
        let pr: PullRequest = self
            .request(reqwest::Method::POST, &format!("/repos/{}/pulls", repo))
            .json(&serde_json::json!({
                "title": title,
                "body": body,
                "head": head,
                "base": base,
            }))
            .send()
            .await?
            .error_for_status()
            .context("could not open pull request")?
            .json()
            .await?;
        info!(%repo, url = %pr.html_url, "Opened pull request");
        Ok(pr.html_url)
    }
}

#[async_trait]
impl CodeSearch for GitHubClient {
    async fn search_code(&self, query: &str, max_results: usize) -> Result<Vec<CodeHit>> {
        let per_page = max_results.to_string();
        let response: CodeSearchResponse = self
            .request(reqwest::Method::GET, "/search/code")
            .query(&[("q", query), ("per_page", per_page.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response
            .items
            .into_iter()
            .take(max_results)
            .map(|item| CodeHit {
                name: item.name,
                path: item.path,
                repository: item.repository.full_name,
                html_url: item.html_url,
            })
            .collect())
    }

    async fn file_content(&self, repo: &str, path: &str) -> Result<String> {
        let entry: ContentEntry = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/contents/{}", repo, path),
            )
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        // The API wraps base64 payloads at 60 columns.
        let packed: String = entry.content.split_whitespace().collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(packed)
            .context("file content is not valid base64")?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_actions_require_token() {
        let client = GitHubClient::new(Some("  ".to_string())).unwrap();
        assert!(!client.has_token());

        let err = client
            .create_branch("octo/demo", "feature", "main")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "GITHUB_TOKEN is not configured");
    }
}
