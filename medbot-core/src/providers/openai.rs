// medbot-core/src/providers/openai.rs
use super::ChatProvider;
use crate::api::{self, RetryPolicy};
use crate::config::ModelConfig;
use crate::models::chat::{ApiResponse, ChatMessage};
use crate::models::tools::ToolDefinition;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{error, trace};

#[derive(Clone)]
pub struct OpenAIProvider {
    config: ModelConfig,
    http_client: Client,
    api_key: String,
    retry: RetryPolicy,
}

impl OpenAIProvider {
    pub fn new(config: ModelConfig, http_client: Client, api_key: String) -> Self {
        Self {
            config,
            http_client,
            api_key,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    fn name(&self) -> &str {
        &self.config.model_name
    }

    async fn get_completion(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ApiResponse> {
        trace!("Entering OpenAIProvider::get_completion");
        let result = api::openai::get_chat_completion(
            &self.http_client,
            &self.config,
            &self.api_key,
            messages,
            tools,
            self.retry,
        )
        .await;

        if let Err(e) = &result {
            error!(model = %self.config.model_name, error = %e, "Chat completion request failed");
        }
        result
    }
}
