//! Conversation history model.
//!
//! A `History` is the ordered list of role-tagged turns sent to the language
//! model. It is append-only and always begins with the system turn.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The persona and command grammar handed to the model as the first turn of every session.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are Jarvis, a helpful and intelligent voice assistant. Follow these guidelines:

1. Provide concise, accurate, and friendly responses.
2. Always cite your sources when using external information.
3. If you're uncertain about something, clearly state "I'm not certain" or "I don't know".
4. When providing code examples, include links to documentation or GitHub repositories.
5. Express confidence levels when appropriate (e.g., "I'm confident that...", "Based on the documentation...").
6. Avoid speculation - stick to facts you can verify.
7. If a question is outside your knowledge, suggest where the user might find the answer.

You have access to the following tools and capabilities:
- **Web Search**: If you need current information, respond with exactly one command:
  SEARCH_WEB: {"query": "what to search for"}
  The search results will be provided to you in the next message.
- **GitHub Integration**: Relevant public code examples may be supplied as additional context.
- **Real-time Interaction**: You can be interrupted by the user at any time.
- **PR Creation**: If the user asks you to create a pull request, respond with:
  CREATE_PR: {"repo": "owner/repo", "title": "PR title", "body": "PR description", "branch": "branch-name", "file_path": "path/to/file", "file_content": "file content", "commit_message": "commit message"}

Your limitations:
- You cannot access the user's private files or local system unless explicitly provided.
- You cannot perform actions on the user's behalf outside of this chat interface.
- PR creation requires a valid GitHub token with write access.
"#;

/// The author of a single conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Output of a tool invocation fed back to the model.
    ToolResult,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::ToolResult => write!(f, "tool_result"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool_result(content: impl Into<String>) -> Self {
        Self::new(Role::ToolResult, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Append-only conversation history whose first entry is the system turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    /// Creates a history holding only the system turn.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt)],
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Always false: the system turn can never be removed.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Returns true if `self` is `base` with zero or more turns appended.
    pub fn extends(&self, base: &History) -> bool {
        self.turns.len() >= base.turns.len() && self.turns[..base.turns.len()] == base.turns[..]
    }

    /// Appends the turns of `newer` that are not yet present.
    ///
    /// Returns false and leaves `self` untouched when `newer` is not an extension of it.
    pub fn merge_from(&mut self, newer: History) -> bool {
        if !newer.extends(self) {
            return false;
        }
        let known = self.turns.len();
        self.turns.extend(newer.turns.into_iter().skip(known));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_history_starts_with_system_turn() {
        let history = History::new("be helpful");
        assert_eq!(history.len(), 1);
        assert_eq!(history.turns()[0], Turn::system("be helpful"));
        assert!(!history.is_empty());
    }

    #[test]
    fn test_merge_from_appends_only_new_turns() {
        let mut base = History::new("sys");
        base.push(Turn::user("hi"));

        let mut working = base.clone();
        working.push(Turn::assistant("SEARCH_WEB: {\"query\": \"x\"}"));
        working.push(Turn::tool_result("results"));

        assert!(base.merge_from(working.clone()));
        assert_eq!(base, working);
    }

    #[test]
    fn test_merge_from_rejects_diverged_history() {
        let mut base = History::new("sys");
        base.push(Turn::user("first"));

        let mut other = History::new("sys");
        other.push(Turn::user("different"));
        other.push(Turn::assistant("reply"));

        assert!(!base.merge_from(other));
        assert_eq!(base.len(), 2);
        assert_eq!(base.last(), Some(&Turn::user("first")));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::ToolResult.to_string(), "tool_result");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
