// medbot-core/src/fallback.rs

//! Primary → secondary provider failover.
//!
//! Failure is reported in-band: when both providers fail the caller gets a
//! text describing both errors instead of an `Err`.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::chat::{ChatMessage, Role};
use crate::models::tools::ToolDefinition;
use crate::providers::{first_assistant_message, ChatProvider, TextProvider};
use crate::ChatBackend;

const TRANSCRIPT_PREAMBLE: &str = "Continue the following conversation as the assistant. \
Tools are unavailable, so answer from general knowledge and say so when a dataset lookup was needed.";

pub struct FallbackLlm {
    primary: Arc<dyn ChatProvider>,
    secondary: Option<Arc<dyn TextProvider>>,
}

impl FallbackLlm {
    pub fn new(primary: Arc<dyn ChatProvider>, secondary: Option<Arc<dyn TextProvider>>) -> Self {
        Self { primary, secondary }
    }

    /// Answers a plain prompt, trying the primary then the secondary.
    pub async fn run(&self, prompt: &str) -> String {
        match self.primary.generate_text(prompt).await {
            Ok(text) => text,
            Err(primary_err) => {
                warn!(
                    provider = %self.primary.name(),
                    error = %primary_err,
                    "Primary provider failed, switching to secondary."
                );
                self.run_secondary(prompt, primary_err).await
            }
        }
    }

    async fn run_secondary(&self, prompt: &str, primary_err: anyhow::Error) -> String {
        let Some(secondary) = &self.secondary else {
            return format!(
                "{} failed and no fallback provider is configured. Primary error: {:#}",
                self.primary.name(),
                primary_err
            );
        };
        match secondary.generate(prompt).await {
            Ok(text) => {
                info!(provider = %secondary.name(), "Secondary provider answered.");
                text
            }
            Err(secondary_err) => {
                warn!(provider = %secondary.name(), error = %secondary_err, "Secondary provider failed too.");
                format!(
                    "Both {} and {} failed. Primary error: {:#}. Secondary error: {:#}",
                    self.primary.name(),
                    secondary.name(),
                    primary_err,
                    secondary_err
                )
            }
        }
    }
}

#[async_trait]
impl ChatBackend for FallbackLlm {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage> {
        let primary_err = match self
            .primary
            .get_completion(messages, tools)
            .await
            .and_then(first_assistant_message)
        {
            Ok(message) => return Ok(message),
            Err(e) => e,
        };

        warn!(
            provider = %self.primary.name(),
            error = %primary_err,
            "Primary provider failed, switching to secondary."
        );
        let prompt = render_transcript(messages);
        debug!(prompt_len = prompt.len(), "Flattened transcript for secondary provider.");
        Ok(ChatMessage::assistant(
            self.run_secondary(&prompt, primary_err).await,
        ))
    }
}

/// Flattens a transcript into a single plain-text prompt.
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    let mut prompt = String::from(TRANSCRIPT_PREAMBLE);
    prompt.push_str("\n\n");
    for message in messages {
        match message.role {
            Role::System => prompt.push_str(&format!("System: {}\n", message.text())),
            Role::User => prompt.push_str(&format!("User: {}\n", message.text())),
            Role::Assistant => {
                if !message.text().is_empty() {
                    prompt.push_str(&format!("Assistant: {}\n", message.text()));
                }
                let calls = message.requested_tool_calls();
                if !calls.is_empty() {
                    let names: Vec<&str> = calls.iter().map(|c| c.function.name.as_str()).collect();
                    prompt.push_str(&format!("Assistant requested tools: {}\n", names.join(", ")));
                }
            }
            Role::Tool => prompt.push_str(&format!(
                "Tool result ({}): {}\n",
                message.name.as_deref().unwrap_or("tool"),
                message.text()
            )),
        }
    }
    prompt.push_str("Assistant:");
    prompt
}
