//! Built-in agents.
//!
//! Only the general assistant lives in the core: it is the router's fallback
//! target and answers directly through the chat model. Real skills (lights,
//! music, timers) register from the host as plugins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::chat::{ChatClient, ChatMessage, ChatRequest};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::registry::{AgentReply, LocalAgent, SessionFactory};
use crate::types::AgentCard;

/// Transcript cap per assistant thread.
const MAX_THREAD_MESSAGES: usize = 20;

/// The catch-all conversational agent.
///
/// Keeps a short transcript per thread handle so follow-up questions stay
/// coherent within a session.
pub struct GeneralAssistantAgent {
    chat: Arc<dyn ChatClient>,
    model: String,
    threads: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl GeneralAssistantAgent {
    /// Registry id of the general assistant.
    pub const ID: &'static str = "general-assistant";

    /// Create the assistant over the given chat client and model.
    pub fn new(chat: Arc<dyn ChatClient>, model: impl Into<String>) -> Self {
        Self {
            chat,
            model: model.into(),
            threads: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl LocalAgent for GeneralAssistantAgent {
    fn card(&self) -> AgentCard {
        AgentCard::new(
            Self::ID,
            "General Assistant",
            "Answers general questions and anything no specialized agent covers.",
            "local",
        )
        .with_capability("conversation")
    }

    async fn invoke(
        &self,
        instruction: &str,
        thread: &str,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<AgentReply> {
        let mut messages = {
            let threads = self.threads.lock().await;
            threads.get(thread).cloned().unwrap_or_else(|| {
                vec![ChatMessage::system(
                    "You are Lucia, a privacy-first home assistant. Answer briefly and \
                     conversationally.",
                )]
            })
        };
        messages.push(ChatMessage::user(instruction));

        let completion = tokio::select! {
            result = self.chat.complete(ChatRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                json_output: false,
            }) => result?,
            _ = cancel.cancelled() => return Err(OrchestratorError::Canceled),
        };

        messages.push(ChatMessage::assistant(completion.clone()));
        if messages.len() > MAX_THREAD_MESSAGES {
            // Keep the system message plus the newest exchanges.
            let keep_from = messages.len() - (MAX_THREAD_MESSAGES - 1);
            let mut trimmed = vec![messages[0].clone()];
            trimmed.extend_from_slice(&messages[keep_from..]);
            messages = trimmed;
        }
        {
            let mut threads = self.threads.lock().await;
            threads.insert(thread.to_string(), messages);
        }

        Ok(AgentReply::text(completion))
    }
}

/// Session factory for the general assistant: one transcript per session.
pub struct AssistantSessionFactory;

#[async_trait]
impl SessionFactory for AssistantSessionFactory {
    async fn create_thread(&self, session_id: &str) -> OrchestratorResult<String> {
        Ok(format!("assistant:{session_id}"))
    }
}
