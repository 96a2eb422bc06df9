//! Bounded tool-calling loop over the language model.

use crate::conversation::{History, Turn};
use crate::llm_client::LLMClient;
use crate::tool::parse_tool_block;
use crate::tool_router::{ToolOutput, ToolRouter};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReasoningSettings {
    pub max_iterations: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            max_tokens: 300,
            temperature: 0.7,
        }
    }
}

/// Result of one reasoning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningOutcome {
    pub text: String,
    /// Number of completion requests issued.
    pub iterations: usize,
    /// A web search tool result was produced.
    pub searched: bool,
    pub pull_request_url: Option<String>,
    /// The budget ran out before the model gave a plain answer.
    pub exhausted: bool,
}

pub struct ReasoningLoop {
    llm: Arc<dyn LLMClient>,
    tools: Arc<ToolRouter>,
    settings: ReasoningSettings,
}

impl ReasoningLoop {
    pub fn new(llm: Arc<dyn LLMClient>, tools: Arc<ToolRouter>, settings: ReasoningSettings) -> Self {
        Self {
            llm,
            tools,
            settings,
        }
    }

    pub fn settings(&self) -> &ReasoningSettings {
        &self.settings
    }

    pub fn tools(&self) -> &ToolRouter {
        &self.tools
    }

    /// Runs completion requests until a response carries no search request.
    ///
    /// Search exchanges are appended to `history` as an assistant turn and a
    /// tool-result turn. The final response itself is not appended. `context`
    /// is sent as a trailing system turn on every request and never stored.
    pub async fn run(&self, history: &mut History, context: Option<&str>) -> Result<ReasoningOutcome> {
        let max_iterations = self.settings.max_iterations.max(1);
        let mut searched = false;
        let mut last_response = String::new();

        for iteration in 1..=max_iterations {
            let mut turns = history.turns().to_vec();
            if let Some(context) = context {
                turns.push(Turn::system(context));
            }

            debug!(iteration, turns = turns.len(), "Requesting completion");
            let response = self
                .llm
                .complete(&turns, self.settings.max_tokens, self.settings.temperature)
                .await?;

            let Some(block) = parse_tool_block(&response) else {
                return Ok(ReasoningOutcome {
                    text: response,
                    iterations: iteration,
                    searched,
                    pull_request_url: None,
                    exhausted: false,
                });
            };

            let invocation = match block.invocation.clone() {
                Ok(invocation) => invocation,
                Err(e) => {
                    warn!(iteration, error = %e, "Tool call could not be parsed");
                    history.push(Turn::assistant(response.clone()));
                    history.push(Turn::tool_result(format!("Tool call failed: {}", e)));
                    last_response = response;
                    continue;
                }
            };

            match self.tools.dispatch(invocation).await {
                ToolOutput::Search(outcome) => {
                    info!(iteration, found = outcome.is_found(), "Search completed");
                    history.push(Turn::assistant(response.clone()));
                    history.push(Turn::tool_result(outcome.to_text()));
                    searched = true;
                    last_response = response;
                }
                ToolOutput::PullRequest(report) => {
                    let (text, url) = match report.result() {
                        Ok(url) => (
                            block.splice(
                                &response,
                                &format!("\n\nI've created a pull request: {}", url),
                            ),
                            Some(url.to_string()),
                        ),
                        Err(e) => {
                            warn!(error = %e, "Pull request was not created");
                            (response, None)
                        }
                    };
                    return Ok(ReasoningOutcome {
                        text,
                        iterations: iteration,
                        searched,
                        pull_request_url: url,
                        exhausted: false,
                    });
                }
            }
        }

        warn!(max_iterations, "Tool iteration budget exhausted");
        Ok(ReasoningOutcome {
            text: last_response,
            iterations: max_iterations,
            searched,
            pull_request_url: None,
            exhausted: true,
        })
    }
}
