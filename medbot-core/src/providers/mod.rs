// medbot-core/src/providers/mod.rs
use crate::models::chat::{ApiResponse, ChatMessage, Role};
use crate::models::tools::ToolDefinition;
use crate::ChatBackend;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub mod gemini;
pub mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAIProvider;

/// A vendor endpoint that supports chat completion with tool calling.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn get_completion(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ApiResponse>;

    fn name(&self) -> &str;

    /// Sends `prompt` as a single user message without tools and returns the
    /// reply text.
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let response = self
            .get_completion(&[ChatMessage::user(prompt)], &[])
            .await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("API response contained no choices"))?;
        choice
            .message
            .content
            .ok_or_else(|| anyhow!("{} returned a response without text content", self.name()))
    }
}

/// A vendor endpoint that only turns a prompt into text.
#[async_trait]
pub trait TextProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Takes the first choice of a completion as the assistant's reply.
pub(crate) fn first_assistant_message(response: ApiResponse) -> Result<ChatMessage> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("API response contained no choices"))?;
    let mut message = choice.message;
    message.role = Role::Assistant;
    Ok(message)
}

/// A [`ChatBackend`] over a single provider. Provider failures are returned
/// to the caller unchanged.
pub struct DirectBackend {
    provider: Arc<dyn ChatProvider>,
}

impl DirectBackend {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ChatBackend for DirectBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage> {
        let response = self.provider.get_completion(messages, tools).await?;
        first_assistant_message(response)
    }
}
