//! Tool Dispatch
//!
//! Executes a parsed `ToolInvocation` against the search resolver or the
//! repository actions. The router never retries; retry policy belongs to the
//! backends. Pull request creation is a strictly ordered three-step sequence
//! that stops at the first failing step, and every step's status is reported.

use crate::github::{CodeSearch, RepositoryActions};
use crate::search::{SearchOutcome, SearchResolver};
use crate::tool::{PullRequestSpec, ToolInvocation};
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tracing::{info, warn};

/// Branch every pull request targets.
pub const BASE_BRANCH: &str = "main";

const CODE_KEYWORDS: &[&str] = &[
    "code", "function", "class", "method", "api", "library", "package", "module", "import",
    "syntax", "error", "bug", "implement", "programming", "developer", "repository", "github",
    "how to", "example", "tutorial", "documentation",
];
const CODE_CONTEXT_RESULTS: usize = 3;
const EXCERPT_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRequestStep {
    CreateBranch,
    WriteFile,
    OpenPullRequest,
}

impl fmt::Display for PullRequestStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullRequestStep::CreateBranch => write!(f, "branch creation"),
            PullRequestStep::WriteFile => write!(f, "file write"),
            PullRequestStep::OpenPullRequest => write!(f, "pull request creation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Failed(String),
    /// Not attempted because an earlier step failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PullRequestStepError {
    #[error("repository actions are not configured")]
    NotConfigured,
    #[error("{step} failed: {reason}")]
    Failed {
        step: PullRequestStep,
        reason: String,
    },
}

/// Per-step record of a pull request attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestReport {
    pub steps: Vec<(PullRequestStep, StepStatus)>,
    pub url: Option<String>,
    configured: bool,
}

impl PullRequestReport {
    fn not_configured() -> Self {
        Self {
            steps: vec![
                (PullRequestStep::CreateBranch, StepStatus::Skipped),
                (PullRequestStep::WriteFile, StepStatus::Skipped),
                (PullRequestStep::OpenPullRequest, StepStatus::Skipped),
            ],
            url: None,
            configured: false,
        }
    }

    pub fn status(&self, step: PullRequestStep) -> Option<&StepStatus> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, status)| status)
    }

    /// The pull request URL, or the first step that failed.
    pub fn result(&self) -> Result<&str, PullRequestStepError> {
        if !self.configured {
            return Err(PullRequestStepError::NotConfigured);
        }
        if let Some((step, StepStatus::Failed(reason))) = self
            .steps
            .iter()
            .find(|(_, status)| matches!(status, StepStatus::Failed(_)))
        {
            return Err(PullRequestStepError::Failed {
                step: *step,
                reason: reason.clone(),
            });
        }
        self.url.as_deref().ok_or(PullRequestStepError::NotConfigured)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    Search(SearchOutcome),
    PullRequest(PullRequestReport),
}

pub struct ToolRouter {
    search: Arc<SearchResolver>,
    repository: Option<Arc<dyn RepositoryActions>>,
    code_search: Option<Arc<dyn CodeSearch>>,
    max_results: usize,
}

impl ToolRouter {
    pub fn new(search: Arc<SearchResolver>, max_results: usize) -> Self {
        Self {
            search,
            repository: None,
            code_search: None,
            max_results,
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn RepositoryActions>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_code_search(mut self, code_search: Arc<dyn CodeSearch>) -> Self {
        self.code_search = Some(code_search);
        self
    }

    pub async fn dispatch(&self, invocation: ToolInvocation) -> ToolOutput {
        match invocation {
            ToolInvocation::SearchWeb(request) => {
                info!(query = %request.query, "Dispatching web search");
                ToolOutput::Search(self.search.resolve(&request.query, self.max_results).await)
            }
            ToolInvocation::CreatePullRequest(spec) => {
                info!(repo = %spec.repo, branch = %spec.branch, "Dispatching pull request");
                ToolOutput::PullRequest(self.open_pull_request(&spec).await)
            }
        }
    }

    async fn open_pull_request(&self, spec: &PullRequestSpec) -> PullRequestReport {
        let Some(repository) = &self.repository else {
            warn!("Pull request requested but repository actions are not configured");
            return PullRequestReport::not_configured();
        };

        let mut report = PullRequestReport {
            steps: Vec::with_capacity(3),
            url: None,
            configured: true,
        };
        let mut failed = false;

        let branch = repository
            .create_branch(&spec.repo, &spec.branch, BASE_BRANCH)
            .await;
        record(&mut report, &mut failed, PullRequestStep::CreateBranch, branch);

        if failed {
            report.steps.push((PullRequestStep::WriteFile, StepStatus::Skipped));
        } else {
            let write = repository
                .write_file(
                    &spec.repo,
                    &spec.file_path,
                    &spec.file_content,
                    &spec.commit_message,
                    &spec.branch,
                )
                .await;
            record(&mut report, &mut failed, PullRequestStep::WriteFile, write);
        }

        if failed {
            report
                .steps
                .push((PullRequestStep::OpenPullRequest, StepStatus::Skipped));
        } else {
            match repository
                .create_pull_request(&spec.repo, &spec.title, &spec.body, &spec.branch, BASE_BRANCH)
                .await
            {
                Ok(url) => {
                    report.url = Some(url);
                    report
                        .steps
                        .push((PullRequestStep::OpenPullRequest, StepStatus::Succeeded));
                }
                Err(e) => record(
                    &mut report,
                    &mut failed,
                    PullRequestStep::OpenPullRequest,
                    Err(e),
                ),
            }
        }
        report
    }

    /// Collects public code examples for code-related questions.
    ///
    /// Returns `None` when the text is not code related, no code search is
    /// configured, or the search fails.
    pub async fn code_context(&self, text: &str) -> Option<String> {
        if !is_code_related(text) {
            return None;
        }
        let code_search = self.code_search.as_ref()?;
        let hits = match code_search.search_code(text, CODE_CONTEXT_RESULTS).await {
            Ok(hits) if !hits.is_empty() => hits,
            Ok(_) => return None,
            Err(e) => {
                warn!(error = %e, "Code search failed");
                return None;
            }
        };

        let mut context = String::from("I found some relevant code examples on GitHub:\n\n");
        for (idx, hit) in hits.iter().enumerate() {
            let _ = write!(
                context,
                "{}. **{}** in {}\n   Link: {}\n   Path: {}\n\n",
                idx + 1,
                hit.name,
                hit.repository,
                hit.html_url,
                hit.path
            );
        }

        let top = &hits[0];
        match code_search.file_content(&top.repository, &top.path).await {
            Ok(content) => {
                let excerpt: Vec<&str> = content.lines().take(EXCERPT_LINES).collect();
                let _ = write!(
                    context,
                    "Excerpt from {}:\n```\n{}\n```\n",
                    top.path,
                    excerpt.join("\n")
                );
            }
            Err(e) => warn!(error = %e, "Could not fetch file excerpt"),
        }

        Some(format!(
            "Additional context from GitHub:\n{}\nUse this information to provide accurate code examples and include the GitHub links in your response.",
            context
        ))
    }
}

fn record(
    report: &mut PullRequestReport,
    failed: &mut bool,
    step: PullRequestStep,
    result: anyhow::Result<()>,
) {
    match result {
        Ok(()) => report.steps.push((step, StepStatus::Succeeded)),
        Err(e) => {
            warn!(%step, error = %e, "Pull request step failed");
            *failed = true;
            report.steps.push((step, StepStatus::Failed(format!("{:#}", e))));
        }
    }
}

/// True when the text mentions programming vocabulary.
pub fn is_code_related(text: &str) -> bool {
    let lower = text.to_lowercase();
    CODE_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}
