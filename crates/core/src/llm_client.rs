use crate::conversation::{Role, Turn};
use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
};
use async_trait::async_trait;
use tracing::debug;

/// A generic client for interacting with an LLM.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Makes a single, non-streaming completion call over the ordered turns.
    async fn complete(&self, turns: &[Turn], max_tokens: u32, temperature: f32) -> Result<String>;
}

/// An implementation of `LLMClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The specific model identifier to use for chat completions (e.g., "gpt-4").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

/// Converts a conversation turn into a chat-completion message.
///
/// The chat API only accepts tool output tied to a native tool call, so
/// tool results are passed as system messages instead.
pub fn to_request_message(turn: &Turn) -> Result<ChatCompletionRequestMessage> {
    let message = match turn.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(turn.content.clone())
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(turn.content.clone())
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(turn.content.clone())
            .build()?
            .into(),
        Role::ToolResult => ChatCompletionRequestSystemMessageArgs::default()
            .content(format!("Tool result:\n{}", turn.content))
            .build()?
            .into(),
    };
    Ok(message)
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn complete(&self, turns: &[Turn], max_tokens: u32, temperature: f32) -> Result<String> {
        let messages = turns
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_completion_tokens(max_tokens)
            .temperature(temperature)
            .build()?;

        debug!(model = %self.model, turns = turns.len(), "Requesting chat completion");
        let response: CreateChatCompletionResponse = self.client.chat().create(request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("LLM response had no text content")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_results_are_sent_as_system_messages() {
        let message = to_request_message(&Turn::tool_result("3 results")).unwrap();
        match message {
            ChatCompletionRequestMessage::System(system) => {
                let json = serde_json::to_value(&system).unwrap();
                assert_eq!(json["content"], "Tool result:\n3 results");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_roles_map_to_matching_messages() {
        assert!(matches!(
            to_request_message(&Turn::user("hi")).unwrap(),
            ChatCompletionRequestMessage::User(_)
        ));
        assert!(matches!(
            to_request_message(&Turn::assistant("hello")).unwrap(),
            ChatCompletionRequestMessage::Assistant(_)
        ));
    }
}
