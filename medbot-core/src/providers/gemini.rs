// medbot-core/src/providers/gemini.rs
use super::TextProvider;
use crate::api::{self, RetryPolicy};
use crate::config::ModelConfig;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::trace;

#[derive(Clone)]
pub struct GeminiProvider {
    config: ModelConfig,
    http_client: Client,
    api_key: String,
    retry: RetryPolicy,
}

impl GeminiProvider {
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
impl TextProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.config.model_name
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        trace!("Entering GeminiProvider::generate");
        api::gemini::generate_content(
            &self.http_client,
            &self.config,
            &self.api_key,
            prompt,
            self.retry,
        )
        .await
    }
}
