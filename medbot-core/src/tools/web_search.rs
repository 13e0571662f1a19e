// medbot-core/src/tools/web_search.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::ToolExecutor;
use crate::api::{send_with_retry, RetryPolicy};
use crate::config::WebSearchConfig;
use crate::models::tools::{ToolDefinition, ToolInput};

pub const WEB_SEARCH_TOOL_NAME: &str = "search_medical_web";

const MAX_SNIPPET_CHARS: usize = 500;

/// A web search collaborator returning a short textual digest.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, question: &str, max_results: usize) -> Result<String>;
}

/// Client for the Tavily search API.
pub struct TavilySearch {
    http_client: Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_env_var: String,
    retry: RetryPolicy,
}

#[derive(Deserialize, Debug)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize, Debug)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilySearch {
    pub fn new(config: &WebSearchConfig, http_client: Client, api_key: Option<String>) -> Self {
        Self {
            http_client,
            endpoint: config.endpoint.clone(),
            api_key,
            api_key_env_var: config.api_key_env_var.clone(),
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, question: &str, max_results: usize) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            anyhow!(
                "web search is not configured; set the {} environment variable",
                self.api_key_env_var
            )
        })?;

        let body = json!({
            "query": question,
            "max_results": max_results,
            "include_answer": true,
            "search_depth": "basic",
        });
        debug!(endpoint = %self.endpoint, max_results, "Sending web search request.");

        let response = send_with_retry(
            || {
                self.http_client
                    .post(&self.endpoint)
                    .header("Authorization", format!("Bearer {}", api_key))
                    .json(&body)
            },
            self.retry,
        )
        .await?;

        let parsed: TavilyResponse = response
            .json()
            .await
            .context("Failed to parse web search response")?;
        Ok(render_results(&parsed, max_results))
    }
}

fn render_results(response: &TavilyResponse, max_results: usize) -> String {
    let mut lines = Vec::new();
    if let Some(answer) = response.answer.as_deref().filter(|a| !a.trim().is_empty()) {
        lines.push(format!("Answer: {}", answer.trim()));
    }
    for (i, result) in response.results.iter().take(max_results).enumerate() {
        let snippet: String = result.content.trim().chars().take(MAX_SNIPPET_CHARS).collect();
        lines.push(format!("{}. {} ({}): {}", i + 1, result.title, result.url, snippet));
    }
    if lines.is_empty() {
        return "No web results found.".to_string();
    }
    lines.join("\n")
}

/// Exposes a [`WebSearch`] as the medical web search tool.
pub struct WebSearchTool {
    search: Arc<dyn WebSearch>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(search: Arc<dyn WebSearch>, max_results: usize) -> Self {
        Self {
            search,
            max_results,
        }
    }

    pub fn definition() -> ToolDefinition {
        ToolDefinition::single_question(
            WEB_SEARCH_TOOL_NAME,
            "Use for medical definitions, symptoms, causes, treatments and other general medical information not contained in the datasets.",
            "The medical question to search the web for.",
        )
    }
}

#[async_trait]
impl ToolExecutor for WebSearchTool {
    async fn execute(&self, input: &ToolInput) -> Result<String> {
        let question = input.required_str("question").map_err(|e| anyhow!(e))?;
        self.search.search(question, self.max_results).await
    }
}
