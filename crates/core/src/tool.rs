//! Embedded tool-call grammar.
//!
//! The model requests an action by writing a marker followed by one JSON
//! object somewhere in its reply:
//!
//! ```text
//! SEARCH_WEB: {"query": "capital of France"}
//! CREATE_PR: {"repo": "owner/repo", "branch": "fix", ...}
//! ```
//!
//! Only the earliest marker in a reply is considered. Parsing yields the
//! byte span of the whole block so callers can rewrite it without re-scanning
//! the text.

use serde::{Deserialize, Serialize};
use std::ops::Range;

pub const SEARCH_MARKER: &str = "SEARCH_WEB:";
pub const PULL_REQUEST_MARKER: &str = "CREATE_PR:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    SearchWeb,
    CreatePullRequest,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::SearchWeb, ToolKind::CreatePullRequest];

    pub fn marker(self) -> &'static str {
        match self {
            ToolKind::SearchWeb => SEARCH_MARKER,
            ToolKind::CreatePullRequest => PULL_REQUEST_MARKER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

/// Everything needed to open a single-file pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestSpec {
    pub repo: String,
    pub branch: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub file_path: String,
    #[serde(alias = "content")]
    pub file_content: String,
    pub commit_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    SearchWeb(SearchRequest),
    CreatePullRequest(PullRequestSpec),
}

impl ToolInvocation {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolInvocation::SearchWeb(_) => ToolKind::SearchWeb,
            ToolInvocation::CreatePullRequest(_) => ToolKind::CreatePullRequest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolParseError {
    #[error("{marker} must be followed by a JSON object")]
    MissingPayload { marker: &'static str },
    #[error("malformed {marker} payload: {reason}")]
    Malformed {
        marker: &'static str,
        reason: String,
    },
}

/// The leading tool block found in a model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolBlock {
    pub kind: ToolKind,
    /// Byte range covering the marker and its JSON object.
    pub span: Range<usize>,
    pub invocation: Result<ToolInvocation, ToolParseError>,
}

impl ToolBlock {
    /// Returns `text` with this block replaced by `replacement`.
    pub fn splice(&self, text: &str, replacement: &str) -> String {
        let mut out = String::with_capacity(text.len() + replacement.len());
        out.push_str(&text[..self.span.start]);
        out.push_str(replacement);
        out.push_str(&text[self.span.end..]);
        out
    }
}

/// Finds and decodes the earliest tool block in `text`, if any.
pub fn parse_tool_block(text: &str) -> Option<ToolBlock> {
    let (start, kind) = ToolKind::ALL
        .iter()
        .filter_map(|kind| text.find(kind.marker()).map(|pos| (pos, *kind)))
        .min_by_key(|(pos, _)| *pos)?;

    let marker = kind.marker();
    let after_marker = start + marker.len();
    let rest = &text[after_marker..];
    let payload_start = after_marker + (rest.len() - rest.trim_start().len());
    let payload = &text[payload_start..];

    if !payload.starts_with('{') {
        return Some(ToolBlock {
            kind,
            span: start..after_marker,
            invocation: Err(ToolParseError::MissingPayload { marker }),
        });
    }

    let mut values = serde_json::Deserializer::from_str(payload).into_iter::<serde_json::Value>();
    let (span, invocation) = match values.next() {
        Some(Ok(value)) => {
            let end = payload_start + values.byte_offset();
            (start..end, decode(kind, value))
        }
        Some(Err(e)) => (
            start..text.len(),
            Err(ToolParseError::Malformed {
                marker,
                reason: e.to_string(),
            }),
        ),
        None => (
            start..after_marker,
            Err(ToolParseError::MissingPayload { marker }),
        ),
    };

    Some(ToolBlock {
        kind,
        span,
        invocation,
    })
}

fn decode(kind: ToolKind, value: serde_json::Value) -> Result<ToolInvocation, ToolParseError> {
    let marker = kind.marker();
    let malformed = |e: serde_json::Error| ToolParseError::Malformed {
        marker,
        reason: e.to_string(),
    };
    match kind {
        ToolKind::SearchWeb => {
            let request: SearchRequest = serde_json::from_value(value).map_err(malformed)?;
            if request.query.trim().is_empty() {
                return Err(ToolParseError::Malformed {
                    marker,
                    reason: "query is empty".to_string(),
                });
            }
            Ok(ToolInvocation::SearchWeb(request))
        }
        ToolKind::CreatePullRequest => serde_json::from_value(value)
            .map(ToolInvocation::CreatePullRequest)
            .map_err(malformed),
    }
}
