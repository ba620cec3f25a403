//! Chat-model abstraction.
//!
//! The router and the built-in assistant only see [`ChatClient`]; the
//! provider SDK stays behind this seam. [`OpenAiChatClient`] covers any
//! OpenAI-compatible endpoint, which is what a self-hosted deployment
//! typically points at.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    /// System instruction.
    System,
    /// End-user content.
    User,
    /// Prior model output.
    Assistant,
}

/// One message in a chat completion request.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// The author role.
    pub role: ChatRole,
    /// The content.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model id.
    pub model: String,
    /// Conversation messages, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Ask the model for a strict JSON object response.
    pub json_output: bool,
}

/// The orchestrator's view of a chat model.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Run one completion and return the assistant text.
    async fn complete(&self, request: ChatRequest) -> OrchestratorResult<String>;
}

/// [`ChatClient`] backed by an OpenAI-compatible API.
///
/// Reads `OPENAI_API_KEY` / `OPENAI_API_BASE` the way the SDK does, so a
/// local inference server works by pointing the base URL at it.
pub struct OpenAiChatClient {
    client: Client<OpenAIConfig>,
}

impl OpenAiChatClient {
    /// Create a client from the ambient SDK configuration.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create a client with an explicit configuration.
    pub fn with_config(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
        }
    }

    fn build_messages(
        messages: &[ChatMessage],
    ) -> OrchestratorResult<Vec<ChatCompletionRequestMessage>> {
        let mut built = Vec::with_capacity(messages.len());
        for message in messages {
            let request_message = match message.role {
                ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(message.content.clone())
                    .build()
                    .map(ChatCompletionRequestMessage::System),
                ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content.clone())
                    .build()
                    .map(ChatCompletionRequestMessage::User),
                ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content.clone())
                    .build()
                    .map(ChatCompletionRequestMessage::Assistant),
            }
            .map_err(|e| OrchestratorError::dependency(format!("build chat message: {e}")))?;
            built.push(request_message);
        }
        Ok(built)
    }
}

impl Default for OpenAiChatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, request: ChatRequest) -> OrchestratorResult<String> {
        let messages = Self::build_messages(&request.messages)?;
        let completion_request = CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            response_format: request.json_output.then_some(ResponseFormat::JsonObject),
            ..Default::default()
        };

        let response = self
            .client
            .chat()
            .create(completion_request)
            .await
            .map_err(|e| OrchestratorError::dependency(format!("chat completion: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| OrchestratorError::dependency("chat completion returned no choices"))?;

        Ok(choice.message.content.unwrap_or_default())
    }
}
